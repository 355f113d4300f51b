mod delivery_service;

pub use delivery_service::{
    DeliveryService, DeliveryServiceDependencies, JoinRequest, MarkReadRequest, NestedAttachment,
    SendMessageRequest, SessionContext,
};
