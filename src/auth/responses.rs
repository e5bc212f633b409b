use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequired {
    pub needs_password_change: bool,
    pub username: String,
    pub change_password_token: String,
}

/// Login either hands out tokens or asks for the initial password change.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(TokenPair),
    PasswordChangeRequired(PasswordChangeRequired),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForceChangePasswordRequest {
    #[serde(default)]
    pub change_password_token: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub message: String,
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub temporary_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_variants_serialize_flat() {
        let tokens = LoginResponse::Tokens(TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        });
        assert_eq!(
            serde_json::to_value(&tokens).expect("serialize"),
            serde_json::json!({"accessToken": "a", "refreshToken": "r"})
        );

        let pending = LoginResponse::PasswordChangeRequired(PasswordChangeRequired {
            needs_password_change: true,
            username: "mod".into(),
            change_password_token: "t".into(),
        });
        assert_eq!(
            serde_json::to_value(&pending).expect("serialize"),
            serde_json::json!({
                "needsPasswordChange": true,
                "username": "mod",
                "changePasswordToken": "t"
            })
        );
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let request: ResetPasswordRequest =
            serde_json::from_str(r#"{"token":"abc"}"#).expect("deserialize");
        assert_eq!(request.token, "abc");
        assert!(request.new_password.is_empty());
    }
}
