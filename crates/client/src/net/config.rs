use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bounded wait for the server's answer to LOGIN / REGISTER.
    pub auth_timeout: Duration,
    /// TCP connect timeout per resolved address.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
