//! Authentication state trait and macro.

use crate::cache::{RevocationStore, SessionStore};
use crate::jwt::JwtConfig;

use super::ip::ClientIpResolver;

/// Trait for state types that provide everything the gates consult.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
    fn sessions(&self) -> &SessionStore;
    fn revocations(&self) -> &RevocationStore;
    fn ip_resolver(&self) -> &ClientIpResolver;
}

/// Implement `HasAuthBackend` for a state struct with the standard fields.
///
/// The struct must have these fields:
/// - `jwt: Arc<JwtConfig>`
/// - `sessions: SessionStore`
/// - `revocations: RevocationStore`
/// - `ip_resolver: ClientIpResolver`
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct MyState {
///     pub jwt: Arc<JwtConfig>,
///     pub sessions: SessionStore,
///     pub revocations: RevocationStore,
///     pub ip_resolver: ClientIpResolver,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
            fn sessions(&self) -> &$crate::cache::SessionStore {
                &self.sessions
            }
            fn revocations(&self) -> &$crate::cache::RevocationStore {
                &self.revocations
            }
            fn ip_resolver(&self) -> &$crate::auth::ClientIpResolver {
                &self.ip_resolver
            }
        }
    };
}
