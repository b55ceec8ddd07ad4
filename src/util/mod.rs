//! Utility functions for common operations.
//!
//! # Examples
//!
//! ```
//! use pressclip::util::{site_host, extract_host};
//!
//! // Turn a catalog publication URL into a site-restricted query host
//! let host = site_host("https://www.example.com/news").unwrap();
//! assert_eq!(host, "example.com");
//!
//! // Leniently pull the host out of a result link
//! assert_eq!(extract_host("https://sub.example.org/a/b"), Some("sub.example.org".to_string()));
//! assert_eq!(extract_host("not a url"), None);
//! ```

mod urls;

pub use urls::{extract_host, site_host, UrlError};
