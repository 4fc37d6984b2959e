use nanoid::nanoid;
use serde::{Deserialize, Serialize};

/// Declares a transparent string identifier with the usual conversions.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub const fn from_string(id: String) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Room identifier chosen by clients
    RoomId
);

string_id!(
    /// Authenticated user identity handed over by the token service
    UserId
);

string_id!(
    /// Backend signaling server identifier (the `{id}` in `server:{id}`)
    ServerId
);

string_id!(
    /// Connection-scoped identity generated by the signaling server.
    ///
    /// A new transport connection always gets a new id; there is no
    /// session continuity across drops.
    ConnectionId
);

impl ConnectionId {
    /// Generate a fresh connection id (`client_` + 9 random characters)
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("client_{}", nanoid!(9)))
    }
}

impl ServerId {
    /// Generate a server id from the hostname plus a random suffix
    #[must_use]
    pub fn generate() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self(format!("{hostname}-{}", nanoid!(6)))
    }
}
