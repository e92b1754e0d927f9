use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Provider credentials kept in a Telegram channel's config blob.
#[derive(Clone, Deserialize)]
pub struct TelegramCredentials {
    /// Bot token from @BotFather.
    pub bot_token: Secret<String>,
}

impl TelegramCredentials {
    /// The token, if one is actually configured.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        let token = self.bot_token.expose_secret();
        if token.is_empty() { None } else { Some(token) }
    }
}

impl std::fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}
