// web-server/src/session.rs
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, CookieJar, Key, SameSite};
use actix_web::HttpRequest;
use common::models::session::SessionData;
use common::{Config, ConfigError, MIN_SESSION_SECRET_LEN};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Cookie-backed session storage.
///
/// Nothing is kept server side: the session lives in a single private
/// (AES-256-GCM encrypted and authenticated) cookie that each request loads
/// and each response rewrites.
pub struct SessionStore {
    key: Key,
    cookie_name: String,
    max_age: CookieDuration,
    secure: bool,
}

impl SessionStore {
    pub fn new(secret: &[u8], cookie_name: impl Into<String>, max_age_secs: i64, secure: bool) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::SessionSecretTooShort(secret.len()));
        }

        Ok(Self {
            key: Key::derive_from(secret),
            cookie_name: cookie_name.into(),
            max_age: CookieDuration::seconds(max_age_secs),
            secure,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            config.session.secret.as_bytes(),
            config.session.cookie_name.clone(),
            config.session.max_age_secs,
            config.is_production(),
        )
    }

    /// Load the session carried by the request. A missing, tampered or
    /// undecodable cookie yields a fresh session.
    pub fn load(&self, req: &HttpRequest) -> SessionHandle<'_> {
        let data = req.cookie(&self.cookie_name).and_then(|cookie| self.open(cookie));

        match data {
            Some(data) => SessionHandle {
                store: self,
                data,
                is_new: false,
                destroyed: false,
            },
            None => SessionHandle {
                store: self,
                data: SessionData::new(),
                is_new: true,
                destroyed: false,
            },
        }
    }

    fn open(&self, cookie: Cookie<'static>) -> Option<SessionData> {
        let mut jar = CookieJar::new();
        jar.add_original(cookie);

        let Some(decrypted) = jar.private(&self.key).get(&self.cookie_name) else {
            tracing::debug!("Discarding session cookie that failed decryption");
            return None;
        };

        match serde_json::from_str::<SessionData>(decrypted.value()) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!("Discarding undecodable session payload: {}", e);
                None
            }
        }
    }

    fn seal(&self, data: &SessionData) -> Result<Cookie<'static>, SessionError> {
        let payload = serde_json::to_string(data)?;
        let cookie = self.base_cookie(payload)
            .max_age(self.max_age)
            .finish();

        let mut jar = CookieJar::new();
        jar.private_mut(&self.key).add(cookie);

        // The jar only holds the cookie we just added
        Ok(jar
            .delta()
            .next()
            .cloned()
            .unwrap_or_else(|| self.removal_cookie()))
    }

    /// Cookie that clears the session on the client
    pub fn removal_cookie(&self) -> Cookie<'static> {
        self.base_cookie(String::new())
            .max_age(CookieDuration::ZERO)
            .finish()
    }

    fn base_cookie(&self, value: String) -> actix_web::cookie::CookieBuilder<'static> {
        Cookie::build(self.cookie_name.clone(), value)
            .path("/")
            .secure(self.secure)
            .http_only(true)
            .same_site(SameSite::Lax)
    }
}

/// One request's view of its session. Mutations only reach the client
/// through the cookie returned by [`SessionHandle::persist`].
pub struct SessionHandle<'a> {
    store: &'a SessionStore,
    data: SessionData,
    is_new: bool,
    destroyed: bool,
}

impl<'a> SessionHandle<'a> {
    pub fn sid(&self) -> Uuid {
        self.data.sid
    }

    /// True when the request carried no usable session cookie
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn nonce(&self) -> Option<&str> {
        if self.destroyed {
            return None;
        }
        self.data.nonce.as_deref()
    }

    /// Bind a nonce, returning the one it replaces
    pub fn set_nonce(&mut self, nonce: String) -> Option<String> {
        self.destroyed = false;
        self.data.bind_nonce(nonce)
    }

    /// Drop the session, including any bound nonce
    pub fn destroy(&mut self) {
        self.data.take_nonce();
        self.destroyed = true;
    }

    /// Cookie to attach to the response: the sealed session, or a removal
    /// cookie if the session was destroyed.
    pub fn persist(self) -> Result<Cookie<'static>, SessionError> {
        if self.destroyed {
            return Ok(self.store.removal_cookie());
        }
        self.store.seal(&self.data)
    }
}
