#[cfg(feature = "client")]
pub use relay_client as client;
#[cfg(feature = "rpc")]
pub use relay_rpc as rpc;
#[cfg(feature = "sign")]
pub use sign_api as sign;
