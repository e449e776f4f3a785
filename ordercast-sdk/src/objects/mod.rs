pub mod notification;
pub mod socket;

pub use notification::{
    AcceptOrderRequest, HealthResponse, OrderAction, OrderNotification, PublishResponse,
    StreamConnected,
};
pub use socket::SocketInbound;
