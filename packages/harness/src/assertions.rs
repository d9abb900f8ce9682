//! Panicking assertion helpers for [`RequestResult`], for use in tests.

use crate::RequestResult;

/// Extension trait adding assertion helpers to [`RequestResult`].
pub trait RequestResultExt {
    /// Assert that the response has the expected status code.
    ///
    /// # Panics
    /// * Panics if the status code doesn't match
    fn assert_status(&self, expected: u16) -> &Self;

    /// Assert that the response status is successful (2xx).
    ///
    /// # Panics
    /// * Panics if the status is not in the 2xx range
    fn assert_success(&self) -> &Self;

    /// Assert that the response has a specific header (case-insensitive
    /// name lookup, exact value match).
    ///
    /// # Panics
    /// * Panics if the header is missing or doesn't match
    fn assert_header(&self, name: &str, expected: &str) -> &Self;

    /// Assert that the response body equals the expected text.
    ///
    /// # Panics
    /// * Panics if the body doesn't equal the expected text
    /// * Panics if the body is absent or not valid UTF-8
    fn assert_body(&self, expected: &str) -> &Self;

    /// Assert that the response body contains the expected text.
    ///
    /// # Panics
    /// * Panics if the body doesn't contain the expected text
    /// * Panics if the body is absent or not valid UTF-8
    fn assert_body_contains(&self, expected: &str) -> &Self;
}

impl RequestResultExt for RequestResult {
    fn assert_status(&self, expected: u16) -> &Self {
        let actual = self
            .status_code()
            .unwrap_or_else(|| panic!("RequestResult #{} has no status code yet", self.id()));
        assert_eq!(actual, expected, "Expected status {expected}, got {actual}");
        self
    }

    fn assert_success(&self) -> &Self {
        let actual = self
            .status_code()
            .unwrap_or_else(|| panic!("RequestResult #{} has no status code yet", self.id()));
        assert!(
            (200..300).contains(&actual),
            "Expected successful status (2xx), got {actual}"
        );
        self
    }

    fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let actual = self
            .get_header(name)
            .unwrap_or_else(|| panic!("Header '{name}' not found"));
        assert_eq!(
            actual, expected,
            "Expected header '{name}' to be '{expected}', got '{actual}'"
        );
        self
    }

    fn assert_body(&self, expected: &str) -> &Self {
        let actual = self.body_str().expect("Response body is not valid UTF-8");
        assert_eq!(
            actual, expected,
            "Expected response body to equal '{expected}', got: {actual}"
        );
        self
    }

    fn assert_body_contains(&self, expected: &str) -> &Self {
        let actual = self.body_str().expect("Response body is not valid UTF-8");
        assert!(
            actual.contains(expected),
            "Expected response body to contain '{expected}', got: {actual}"
        );
        self
    }
}
