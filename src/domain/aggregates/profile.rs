//! Customer profile

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::domain::text_enum;
use crate::domain::value_objects::{validate_phone, Address};

text_enum! {
    pub enum Role { Customer => "customer", Admin => "admin" }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Json<Address>>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    #[validate]
    pub address: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_update_validation() {
        let update = ProfileUpdate { full_name: Some("Kabir Rao".into()), phone: Some("9876543210".into()), address: None };
        assert!(update.validate().is_ok());

        let update = ProfileUpdate { phone: Some("123".into()), ..ProfileUpdate::default() };
        assert!(update.validate().is_err());

        let update = ProfileUpdate { address: Some(Address::default()), ..ProfileUpdate::default() };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_role_text() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }
}
