use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Provider credentials kept in a WhatsApp channel's config blob.
#[derive(Clone, Deserialize)]
pub struct WhatsAppCredentials {
    /// Meta app secret, used to verify webhook signatures.
    pub app_secret: Option<Secret<String>>,
    /// Token echoed back during the webhook subscription handshake.
    pub verify_token: Option<String>,
    /// Graph API bearer token.
    pub access_token: Option<Secret<String>>,
    /// Sending phone number id.
    pub phone_number_id: Option<String>,
}

impl WhatsAppCredentials {
    #[must_use]
    pub fn app_secret(&self) -> Option<&str> {
        self.app_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }
}

impl std::fmt::Debug for WhatsAppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppCredentials")
            .field("app_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .finish_non_exhaustive()
    }
}
