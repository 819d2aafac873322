//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter        | Implements              | Connects to               |
//! |----------------|-------------------------|---------------------------|
//! | `hardware`     | `embedded-hal` pins     | simulated GPIO levels     |
//! | `log_sink`     | EventSink               | `log` facade / memory     |
//! | `memory_store` | StoreGateway            | in-memory herd tables     |
//! | `time`         | Clock                   | system or manual clock    |

pub mod hardware;
pub mod log_sink;
pub mod memory_store;
pub mod time;
