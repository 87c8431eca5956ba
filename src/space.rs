//! Resolves a space name to its id through Onezone.

use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{error::SpaceError, http::base_url};

#[derive(Debug, Deserialize)]
struct UserSpaces {
   #[serde(default)]
   spaces: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SpaceDetails {
   name:     String,
   #[serde(rename = "spaceId")]
   space_id: Option<String>,
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: String) -> Result<T, SpaceError> {
   let response = client.get(&url).send().await?;
   let status = response.status();
   if !status.is_success() {
      return Err(SpaceError::Status { url, status: status.as_u16() });
   }
   Ok(response.json().await?)
}

/// Finds the id of the single space called `name` that the token can see.
pub async fn resolve_space_id(
   client: &Client,
   onezone_host: &str,
   name: &str,
) -> Result<String, SpaceError> {
   let api = format!("{}/api/v3/onezone", base_url(onezone_host));
   let listed: UserSpaces = get_json(client, format!("{api}/user/spaces")).await?;
   tracing::debug!(count = listed.spaces.len(), "listing spaces visible to token");

   let mut matches = Vec::new();
   for id in listed.spaces {
      let details: SpaceDetails = get_json(client, format!("{api}/spaces/{id}")).await?;
      if details.name == name {
         matches.push(details.space_id.unwrap_or(id));
      }
   }

   match matches.len() {
      0 => Err(SpaceError::NotFound(name.to_string())),
      1 => Ok(matches.remove(0)),
      _ => Err(SpaceError::Ambiguous { name: name.to_string(), ids: matches }),
   }
}
