// HTTP and WebSocket APIs

pub mod sensors;
pub mod websocket;

pub use sensors::{create_sensor_router, SensorAppState};
pub use websocket::{create_ws_router, StatusChangeMessage, WsAppState};
