//! Authentication state as seen by the cart.

use crate::types::UserId;

/// Who is signed in
///
/// The auth provider can report a user id while the session is not (or no
/// longer) authenticated; only the pair of both counts as a signed-in user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// Stable user identifier, if known
    pub user_id: Option<UserId>,
    /// Whether the session is authenticated
    pub is_authenticated: bool,
}

impl AuthContext {
    /// An authenticated session for `user_id`
    #[must_use]
    pub fn signed_in(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_authenticated: true,
        }
    }

    /// No session
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            user_id: None,
            is_authenticated: false,
        }
    }

    /// The signed-in user, if the session is authenticated and has an id
    #[must_use]
    pub fn active_user(&self) -> Option<&UserId> {
        self.user_id.as_ref().filter(|_| self.is_authenticated)
    }
}
