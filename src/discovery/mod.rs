//! 服务发现模块
//!
//! - [`Instancer`]：跟随注册中心中某个服务前缀下的实例集合
//! - [`ClientInstancer`]：为每个实例缓存一个客户端句柄
//! - [`KeyLayout`]：注册 key 的布局 `/services/<service>/<transport>/<instance>`

pub mod client_instancer;
pub mod instance;
pub mod instancer;

pub use client_instancer::ClientInstancer;
pub use instance::{InstanceSet, KeyLayout, ServiceInstance};
pub use instancer::{InstanceStream, Instancer};
