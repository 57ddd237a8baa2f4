//! User account models

use serde::Deserialize;
use validator::Validate;

/// Credentials for logging in
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// First administrator, created while no user exists
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetupInput {
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password2: String,
}

/// Input for an administrator creating a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Input for an administrator editing a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(email)]
    pub email: String,
    pub is_admin: bool,
}

/// Input for a user editing their own profile
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(email)]
    pub email: String,
}

/// Input for a user changing their own password
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    #[serde(default)]
    pub old_pass: String,
    #[serde(default)]
    pub new_pass: String,
    #[serde(default, alias = "repet_new_pass")]
    pub repeat_new_pass: String,
}

/// Input for switching the UI theme
#[derive(Debug, Clone, Deserialize)]
pub struct ThemeInput {
    #[serde(default)]
    pub theme: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_email_validated() {
        let input = CreateUserInput {
            username: "jperez".into(),
            password: "changeme123".into(),
            email: "no-es-correo".into(),
            name: "Juan Pérez".into(),
            is_admin: false,
        };
        assert!(input.validate().is_err());

        let ok = CreateUserInput {
            email: "jperez@bodega.cl".into(),
            ..input
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_setup_email_validated() {
        let input: SetupInput = serde_json::from_str(
            r#"{"name":"Admin","username":"admin","email":"admin-sin-arroba","password":"changeme123","password2":"changeme123"}"#,
        )
        .unwrap();
        assert!(input.validate().is_err());

        let ok = SetupInput {
            email: "admin@bodega.cl".into(),
            ..input
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_profile_requires_name() {
        let input = UpdateProfileInput {
            name: String::new(),
            email: "a@b.cl".into(),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_change_password_legacy_field() {
        let input: ChangePasswordInput = serde_json::from_str(
            r#"{"old_pass":"a","new_pass":"b","repet_new_pass":"b"}"#,
        )
        .unwrap();
        assert_eq!(input.repeat_new_pass, "b");
    }
}
