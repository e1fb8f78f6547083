use std::net::IpAddr;
use std::sync::Arc;

use longpoll_core::AccessError;

use crate::registry::SessionRegistry;
use crate::session::Session;

/// True for `127.0.0.0/8`, `::1`, and IPv4-mapped forms of either.
pub fn is_loopback(addr: IpAddr) -> bool {
    addr.to_canonical().is_loopback()
}

/// Admits loopback requests carrying a known token.
#[derive(Clone, Debug)]
pub struct AccessGuard {
    registry: Arc<SessionRegistry>,
}

impl AccessGuard {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve a request to its session. Origin is checked before the token.
    pub fn authorize(
        &self,
        origin: IpAddr,
        token: Option<&str>,
    ) -> Result<Arc<Session>, AccessError> {
        if !is_loopback(origin) {
            return Err(AccessError::ForbiddenOrigin);
        }
        let token = token.ok_or(AccessError::UnknownCredential)?;
        self.registry
            .resolve(token)
            .cloned()
            .ok_or(AccessError::UnknownCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn guard() -> AccessGuard {
        let registry = SessionRegistry::from_pairs([("A", "tok-A")]).unwrap();
        AccessGuard::new(Arc::new(registry))
    }

    #[test]
    fn loopback_addresses() {
        assert!(is_loopback(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_loopback(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_loopback("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_loopback("192.168.1.10".parse().unwrap()));
        assert!(!is_loopback("::ffff:10.0.0.1".parse().unwrap()));
        assert!(!is_loopback(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
    }

    #[test]
    fn admits_local_known_token() {
        let session = guard()
            .authorize(IpAddr::V4(Ipv4Addr::LOCALHOST), Some("tok-A"))
            .unwrap();
        assert_eq!(session.name().as_str(), "A");
    }

    #[test]
    fn remote_origin_rejected_before_token_check() {
        let err = guard()
            .authorize("10.1.2.3".parse().unwrap(), Some("tok-A"))
            .unwrap_err();
        assert_eq!(err, AccessError::ForbiddenOrigin);
    }

    #[test]
    fn unknown_or_missing_token_rejected() {
        let g = guard();
        let local = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(
            g.authorize(local, Some("nope")).unwrap_err(),
            AccessError::UnknownCredential
        );
        assert_eq!(
            g.authorize(local, None).unwrap_err(),
            AccessError::UnknownCredential
        );
    }
}
