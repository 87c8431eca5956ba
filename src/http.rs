//! Shared HTTP client setup for Onezone and Oneprovider calls.

use reqwest::{
   Client,
   header::{HeaderMap, HeaderValue},
};

use crate::{
   Result,
   error::{ConfigError, Error},
};

pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Builds a client that sends the access token on every request.
///
/// No overall request timeout is set: the change feed is a long poll whose
/// duration is bounded by the provider-side `timeout` parameter.
pub fn client(token: &str, insecure: bool) -> Result<Client> {
   let mut headers = HeaderMap::new();
   let mut value = HeaderValue::from_str(token).map_err(|_| ConfigError::Invalid {
      field:  "token",
      reason: "not a valid header value".to_string(),
   })?;
   value.set_sensitive(true);
   headers.insert(AUTH_HEADER, value);

   Client::builder()
      .default_headers(headers)
      .danger_accept_invalid_certs(insecure)
      .build()
      .map_err(Error::HttpClient)
}

/// Prepends `https://` when the host was given without a scheme.
pub fn base_url(host: &str) -> String {
   let host = host.trim_end_matches('/');
   if host.starts_with("http://") || host.starts_with("https://") {
      host.to_string()
   } else {
      format!("https://{host}")
   }
}
