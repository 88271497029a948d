//! The concrete handlers plugged into the static table. Split one module
//! per conversational area rather than one file.

pub mod application_services;
pub mod cancel;
pub mod conversation;
pub mod hosting;
pub mod identity_lookup;
pub mod list_roles;
pub mod ping;
pub mod profile;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use crate::handler::{Handler, HandlerTable, RequestKind};

/// Builds the process-wide static handler table: a static table keyed by
/// the inner request enum discriminant, in place of dynamic dispatch.
/// Constructed once at startup and shared read-only across every
/// connection.
pub fn build_handler_table() -> HandlerTable {
    let mut table = HandlerTable::default();

    table.insert(RequestKind::Ping, Arc::new(ping::Ping) as Arc<dyn Handler>);
    table.insert(RequestKind::ListRoles, Arc::new(list_roles::ListRoles) as Arc<dyn Handler>);
    table.insert(RequestKind::IdentityLookup, Arc::new(identity_lookup::IdentityLookup) as Arc<dyn Handler>);
    table.insert(RequestKind::ProfileLookup, Arc::new(identity_lookup::ProfileLookup) as Arc<dyn Handler>);
    table.insert(RequestKind::StartConversation, Arc::new(conversation::StartConversation) as Arc<dyn Handler>);
    table.insert(RequestKind::VerifyIdentity, Arc::new(conversation::VerifyIdentity) as Arc<dyn Handler>);
    table.insert(RequestKind::CheckIn, Arc::new(conversation::CheckIn) as Arc<dyn Handler>);
    table.insert(RequestKind::HomeNodeRequest, Arc::new(hosting::HomeNodeRequest) as Arc<dyn Handler>);
    table.insert(RequestKind::RegisterHosting, Arc::new(hosting::RegisterHosting) as Arc<dyn Handler>);
    table.insert(RequestKind::UpdateProfile, Arc::new(profile::UpdateProfile) as Arc<dyn Handler>);
    table.insert(RequestKind::CancelHomeNodeAgreement, Arc::new(cancel::CancelHomeNodeAgreement) as Arc<dyn Handler>);
    table.insert(RequestKind::CancelHostingAgreement, Arc::new(cancel::CancelHostingAgreement) as Arc<dyn Handler>);
    table.insert(RequestKind::ApplicationServiceAdd, Arc::new(application_services::ApplicationServiceAdd) as Arc<dyn Handler>);
    table.insert(
        RequestKind::ApplicationServiceRemove,
        Arc::new(application_services::ApplicationServiceRemove) as Arc<dyn Handler>,
    );

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_request_kind_has_a_registered_handler() {
        let table = build_handler_table();
        for kind in [
            RequestKind::Ping,
            RequestKind::ListRoles,
            RequestKind::IdentityLookup,
            RequestKind::ProfileLookup,
            RequestKind::StartConversation,
            RequestKind::VerifyIdentity,
            RequestKind::CheckIn,
            RequestKind::HomeNodeRequest,
            RequestKind::RegisterHosting,
            RequestKind::UpdateProfile,
            RequestKind::CancelHomeNodeAgreement,
            RequestKind::CancelHostingAgreement,
            RequestKind::ApplicationServiceAdd,
            RequestKind::ApplicationServiceRemove,
        ] {
            assert!(table.contains_key(&kind), "missing handler for {kind:?}");
        }
    }
}
