pub mod server;

use crate::config::GateConfig;

#[derive(Debug)]
pub enum Action {
    Server { port: u16, config: GateConfig },
}
