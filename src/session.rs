use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

const FALLBACK_NAME: &str = "User";

/// Explicit session state handed to the components that need it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionContext {
    display_name: Option<String>,
    active: bool,
}

impl SessionContext {
    pub fn signed_in(display_name: impl Into<String>) -> Self {
        let name = display_name.into();
        let trimmed = name.trim();
        Self {
            display_name: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            active: true,
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(FALLBACK_NAME)
    }

    pub fn require_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(MonitorError::SessionInactive)
        }
    }

    pub fn greeting(&self) -> String {
        format!("Welcome back, {}", self.display_name())
    }
}
