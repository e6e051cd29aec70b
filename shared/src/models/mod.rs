//! Entity models shared across the platform.

pub mod cart;
pub mod category;
pub mod loyalty;
pub mod order;
pub mod payment;
pub mod product;
pub mod setting;
pub mod user;
pub mod warehouse;

pub use cart::{Cart, CartItem, CartItemCreate};
pub use category::{Category, CategoryCreate, CategoryNode, CategoryUpdate};
pub use loyalty::{PointTransaction, PointTransactionKind};
pub use order::{
    Order, OrderItem, OrderLine, OrderStatus, OrderStatusHistory, SYSTEM_ACTOR,
};
pub use payment::{
    PaymentMethod, PaymentMethodCreate, PaymentStatus, PaymentTransaction,
};
pub use product::{
    Product, ProductCreate, ProductUpdate, ProductVariant, ProductVariantCreate,
    ProductVariantUpdate,
};
pub use setting::{Setting, SettingValue};
pub use user::{User, UserCreate, UserPublic, UserUpdate};
pub use warehouse::{
    InventoryTransaction, StockAlert, VariantStock, Warehouse, WarehouseCreate,
};
