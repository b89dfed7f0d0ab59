use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use reqwest::blocking::{Client, Response};
use serde_json::Value;

/// Runs a request closure again after a short pause when it fails.
/// Only used for read requests; writes are never replayed.
pub fn retrying<T, F>(retries: u8, retry_secs: f64, closure: F) -> Result<T>
where F: Fn() -> Result<T> {
  match (closure(), retries) {
    (Ok(r), _) => Ok(r),
    (Err(e), 0) => Err(e),
    (Err(_), _) => {
      log::debug!("request failed but {} {} left, will retry in {} seconds",
        retries,
        if retries == 1 {"retry"} else {"retries"},
        retry_secs);
      std::thread::sleep(Duration::from_secs_f64(retry_secs));
      retrying(retries - 1, retry_secs, closure)
    }
  }
}

/// A blocking client with a cookie store; both portals track the session
/// through cookies once the login call has been made.
pub fn session_client() -> Result<Client> {
  Client::builder()
    .cookie_store(true)
    .timeout(Duration::from_secs(45))
    .build()
    .map_err(|_| anyhow!("could not build the http client"))
}

fn checked(r: Response, url: &str) -> Result<Response> {
  if !r.status().is_success() {
    bail!("error code on request to {}: {}", url, r.status());
  }
  Ok(r)
}

pub fn get_text(client: &Client, url: &str) -> Result<String> {
  let r = retrying(2, 1.0, || {
    let r = client.get(url).send()
      .map_err(|_| anyhow!("could not send GET request to {}", url))?;
    checked(r, url)
  })?;
  r.text().map_err(|_| anyhow!("body error reading {}", url))
}

pub fn get_json(client: &Client, url: &str) -> Result<Value> {
  let body = get_text(client, url)?;
  serde_json::from_str(&body)
    .map_err(|_| anyhow!("could not parse response body of {} as json", url))
}

/// POST with query-string parameters, returning the body. The legacy
/// portal uses this shape for its schedule pages.
pub fn post_query_text(client: &Client, url: &str, query: &[(&str, &str)]) -> Result<String> {
  let r = retrying(2, 1.0, || {
    let r = client.post(url).query(query).send()
      .map_err(|_| anyhow!("could not send POST request to {}", url))?;
    checked(r, url)
  })?;
  r.text().map_err(|_| anyhow!("body error reading {}", url))
}

/// POST with a form-encoded body, returning the body. Used by the
/// attendance pages of the legacy portal.
pub fn post_form_text(client: &Client, url: &str, form: &[(&str, &str)]) -> Result<String> {
  let r = retrying(2, 1.0, || {
    let r = client.post(url).form(form).send()
      .map_err(|_| anyhow!("could not send POST request to {}", url))?;
    checked(r, url)
  })?;
  r.text().map_err(|_| anyhow!("body error reading {}", url))
}

/// POST a json payload and parse the json response. No replay: most of
/// these calls write on the server side.
pub fn post_json(client: &Client, url: &str, payload: &Value) -> Result<Value> {
  let r = client.post(url).json(payload).send()
    .map_err(|_| anyhow!("could not send POST request to {}", url))?;
  let r = checked(r, url)?;
  r.json().map_err(|_| anyhow!("could not parse response body of {} as json", url))
}

/// POST with an empty body (the message endpoints work this way).
pub fn post_empty_json(client: &Client, url: &str) -> Result<Value> {
  let r = client.post(url).send()
    .map_err(|_| anyhow!("could not send POST request to {}", url))?;
  let r = checked(r, url)?;
  r.json().map_err(|_| anyhow!("could not parse response body of {} as json", url))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;

  #[test]
  fn test_retry_counts_attempts() {
    let calls = Cell::new(0u8);
    let r: Result<()> = retrying(2, 0.0, || {
      calls.set(calls.get() + 1);
      bail!("nope")
    });
    assert!(r.is_err());
    assert_eq!(calls.get(), 3);
  }

  #[test]
  fn test_retry_stops_on_success() {
    let calls = Cell::new(0u8);
    let r = retrying(5, 0.0, || {
      calls.set(calls.get() + 1);
      if calls.get() < 2 { bail!("again") } else { Ok(calls.get()) }
    });
    assert_eq!(r.unwrap(), 2);
  }
}
