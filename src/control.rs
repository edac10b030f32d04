//! Command lines for the wireless supplicant's control interface.

/// Builds `wpa_cli` argument vectors.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    program: String,
}

impl ControlPlane {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// A request without an explicit interface; the supplicant picks one.
    pub fn global(&self, args: &[&str]) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }

    /// A request addressed to `interface` (`wpa_cli -i<interface> ...`).
    pub fn on(&self, interface: &str, args: &[&str]) -> Vec<String> {
        [self.program.clone(), format!("-i{}", interface)]
            .into_iter()
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new("wpa_cli")
    }
}
