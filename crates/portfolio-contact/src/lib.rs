//! `portfolio-contact` - contact form backend for a personal portfolio site
//!
//! Validates contact form submissions, gates them with a per-IP rate limit and
//! duplicate detection, stores accepted ones in SQLite and notifies the site
//! owner and the sender by email without holding up the HTTP response.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod admission;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod notify;
pub mod service;
pub mod storage;
pub mod submission;
pub mod validation;

pub use admission::{AdmissionPolicy, Rejection, Verdict};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use notify::{Mailer, Notifier};
pub use service::{ClientInfo, ContactService, SubmitError};
pub use storage::{Storage, SubmissionStats};
pub use submission::{Submission, SubmissionStatus};
pub use validation::{ContactForm, FieldError};
