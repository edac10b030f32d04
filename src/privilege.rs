//! Privilege elevation for the few commands that need root.
//!
//! Only two call sites use this: gateway address assignment
//! ([`crate::network`]) and the DHCP daemon launch ([`crate::dhcp`]).
//! Keeping the wrapper in one place makes those the only commands to audit.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Privilege {
    wrapper: Vec<String>,
}

impl Privilege {
    pub fn new(wrapper: Vec<String>) -> Self {
        Self { wrapper }
    }

    /// Run commands as the current user, e.g. when already root.
    pub fn none() -> Self {
        Self { wrapper: Vec::new() }
    }

    pub fn wrap(&self, argv: Vec<String>) -> Vec<String> {
        self.wrapper.iter().cloned().chain(argv).collect()
    }

    pub fn is_elevated(&self) -> bool {
        !self.wrapper.is_empty()
    }
}

impl Default for Privilege {
    fn default() -> Self {
        Self::new(vec!["sudo".to_string()])
    }
}
