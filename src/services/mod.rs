pub mod email_service;
pub mod extraction_service;
pub mod queue_service;
pub mod submission_service;
