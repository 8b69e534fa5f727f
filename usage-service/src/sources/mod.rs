pub mod portal_poll;

pub use portal_poll::PortalPollSource;
