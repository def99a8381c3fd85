//! Access tokens and the identity attached to an authenticated request

use std::fmt;

use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bearer access token presented with a request
///
/// The token is never shown in full by [`Debug`][AccessTokenRef#impl-Debug],
/// so that it does not leak into logs.
#[braid(
    serde,
    debug = "owned",
    ref_doc = "A borrowed reference to a bearer access token ([`AccessToken`])"
)]
#[must_use]
pub struct AccessToken;

impl fmt::Debug for AccessTokenRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let raw = self.as_str();
        match raw.char_indices().nth(4) {
            Some((idx, _)) => write!(f, "\"{}…\"", &raw[..idx]),
            None => f.write_str("\"…\""),
        }
    }
}

macro_rules! json_object {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Map<String, Value>);

        impl $name {
            /// Looks up a single member by name
            #[must_use]
            pub fn get(&self, name: &str) -> Option<&Value> {
                self.0.get(name)
            }

            /// Looks up a single member by name, if it is a string
            #[must_use]
            pub fn get_str(&self, name: &str) -> Option<&str> {
                self.0.get(name).and_then(Value::as_str)
            }

            /// Iterates over all members
            pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
                self.0.iter()
            }

            /// Unwraps the underlying JSON object
            #[must_use]
            pub fn into_inner(self) -> Map<String, Value> {
                self.0
            }
        }

        impl From<Map<String, Value>> for $name {
            #[inline]
            fn from(map: Map<String, Value>) -> Self {
                Self(map)
            }
        }
    };
}

json_object! {
    /// The verified claims carried by an access token
    AccessTokenClaims
}

impl AccessTokenClaims {
    /// The `sub` claim
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// The `iss` claim
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }
}

json_object! {
    /// Profile attributes retrieved from the identity provider
    UserInfo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_reveal_the_token() {
        let token = AccessToken::from_static("eyJhbGciOiJIUzI1NiJ9.secret.signature");

        assert_eq!(format!("{:?}", &*token), "\"eyJh…\"");
    }

    #[test]
    fn claims_expose_standard_members() {
        let claims: AccessTokenClaims =
            serde_json::from_value(serde_json::json!({ "sub": "u1", "iss": "https://id.test" }))
                .unwrap();

        assert_eq!(claims.subject(), Some("u1"));
        assert_eq!(claims.issuer(), Some("https://id.test"));
        assert!(claims.get("aud").is_none());
    }
}
