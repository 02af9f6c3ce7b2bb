use serde::{Deserialize, Serialize};

use gatehouse_core::UserId;

use crate::PermissionBit;

/// Identity of an authenticated caller, as embedded in a claim.
///
/// Request pipelines receive their own copy (it is `Clone`, never shared by
/// reference between requests).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: UserId,
    #[serde(rename = "userName", default)]
    pub display_name: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(rename = "pbit")]
    pub permission_bit: PermissionBit,
}

impl UserContext {
    pub fn new(user_id: UserId, permission_bit: PermissionBit) -> Self {
        Self {
            user_id,
            display_name: String::new(),
            locale: String::new(),
            zone_id: String::new(),
            permission_bit,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>, zone_id: impl Into<String>) -> Self {
        self.locale = locale.into();
        self.zone_id = zone_id.into();
        self
    }
}
