use greentic_events_spec::ConfigMap;

/// Optional checks the suite runs when a backend opts in.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    /// A configuration the backend must refuse with an invalid-config error.
    pub invalid_config: Option<ConfigMap>,
    /// Close the plugin at the end of the run and check it stays closed.
    pub close: bool,
}

impl Capabilities {
    pub fn with_invalid_config(mut self, config: ConfigMap) -> Self {
        self.invalid_config = Some(config);
        self
    }

    pub const fn with_close(mut self) -> Self {
        self.close = true;
        self
    }
}
