use std::net::SocketAddr;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:5000")]
    pub address: SocketAddr,

    /// Log every request header instead of just the interesting ones.
    #[envconfig(default = "false")]
    pub dev_mode: bool,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}
