//! Live Viewer Channel
//!
//! Pushes registry state to dashboards over WebSocket and accepts their
//! commands.
//!
//! ## Architecture
//!
//! - **EventFanout**: Bounded broadcast of registry events to every viewer
//! - **ViewerSession**: Per-viewer ordering (snapshot first, then newer updates only)
//! - **Handler**: WebSocket upgrade and frame processing
//! - **Messages**: Viewer wire format
//!
//! ## Usage
//!
//! Viewers connect to `/ws`. The first frame is always `init` with the full
//! registry, followed by `update` frames (one node each) and `liveness`
//! frames. Commands go the other way:
//!
//! ```javascript
//! const ws = new WebSocket('ws://[::1]:12345/ws');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'update') render(msg.id, msg.node);
//! };
//!
//! ws.send(JSON.stringify({type: 'coap_send', addr: 'fd00::1', ep: 'a:rgb', val: '255,0,0'}));
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{EventFanout, FanoutConfig, FanoutError, Subscription, ViewerId, ViewerSession};
pub use messages::{ClientMessage, FanoutEvent, ViewerMessage};
