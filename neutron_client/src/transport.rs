// Neutron Probe: API and Scenario Tests for OpenStack Networking
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # HTTP Transport
//!
//! Shared request handling for all service clients: attaching the token, serializing the body,
//! and turning non-success responses into [`Error`]s.

use crate::{Error, Result};

use isahc::{HttpClient, ReadResponseExt, Request, Response};
use log::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Handle to one service endpoint, authenticated with a token.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: Arc<HttpClient>,
    base: String,
    token: Option<String>,
}

impl Transport {
    pub(crate) fn new(http: Arc<HttpClient>, base: impl AsRef<str>, token: Option<String>) -> Self {
        Self { http, base: base.as_ref().trim_end_matches('/').to_string(), token }
    }

    pub(crate) fn get<T: DeserializeOwned>(&self, key: impl AsRef<str>) -> Result<T> {
        let addr = self.address(key);
        trace!("GET  {}", addr);
        let request = self.authorize(Request::get(addr.as_str())).body(())?;
        Ok(serde_json::from_str(&self.handle_response(self.http.send(request)?)?)?)
    }

    pub(crate) fn post<T: DeserializeOwned>(
        &self,
        key: impl AsRef<str>,
        data: &Value,
    ) -> Result<T> {
        let addr = self.address(key);
        let data = serde_json::to_string(data)?;
        trace!("POST {} {}", addr, data);
        let request = self.authorize(Request::post(addr.as_str())).body(data)?;
        Ok(serde_json::from_str(&self.handle_response(self.http.send(request)?)?)?)
    }

    /// Same as `post`, but returns the raw response, such that headers can be inspected.
    pub(crate) fn post_raw(
        &self,
        key: impl AsRef<str>,
        data: &Value,
    ) -> Result<(Response<isahc::Body>, String)> {
        let addr = self.address(key);
        let data = serde_json::to_string(data)?;
        trace!("POST {}", addr);
        let request = self.authorize(Request::post(addr.as_str())).body(data)?;
        let mut response = self.http.send(request)?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &text));
        }
        Ok((response, text))
    }

    pub(crate) fn put<T: DeserializeOwned>(
        &self,
        key: impl AsRef<str>,
        data: &Value,
    ) -> Result<T> {
        let addr = self.address(key);
        let data = serde_json::to_string(data)?;
        trace!("PUT  {} {}", addr, data);
        let request = self.authorize(Request::put(addr.as_str())).body(data)?;
        Ok(serde_json::from_str(&self.handle_response(self.http.send(request)?)?)?)
    }

    pub(crate) fn delete(&self, key: impl AsRef<str>) -> Result<()> {
        let addr = self.address(key);
        trace!("DEL  {}", addr);
        let request = self.authorize(Request::delete(addr.as_str())).body(())?;
        self.handle_response(self.http.send(request)?)?;
        Ok(())
    }

    fn address(&self, key: impl AsRef<str>) -> String {
        format!("{}/{}", self.base, key.as_ref().trim_start_matches('/'))
    }

    fn authorize(&self, builder: isahc::http::request::Builder) -> isahc::http::request::Builder {
        let builder = builder
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        match self.token.as_ref() {
            Some(token) => builder.header("X-Auth-Token", token.as_str()),
            None => builder,
        }
    }

    fn handle_response(&self, mut response: Response<isahc::Body>) -> Result<String> {
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            debug!("request failed with status {}: {}", status.as_u16(), text);
            return Err(Error::from_status(status.as_u16(), &text));
        }
        // 204 No Content and friends
        if text.trim().is_empty() {
            return Ok(String::from("null"));
        }
        Ok(text)
    }
}

/// Extract the human readable message from an error body. Neutron wraps it in `NeutronError`,
/// Nova and Keystone use a single top-level key (like `itemNotFound` or `error`). If nothing
/// matches, the body is returned as is.
pub(crate) fn error_message(body: &str) -> String {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };
    value
        .as_object()
        .and_then(|o| o.values().find_map(|inner| inner.get("message")))
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
        .unwrap_or_else(|| body.trim().to_string())
}

/// Remove the field `key` from a response object and deserialize it.
pub(crate) fn take<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<T> {
    let inner = value
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| Error::MissingField(key.to_string()))?;
    Ok(serde_json::from_value(inner)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_extraction() {
        assert_eq!(
            error_message(
                r#"{"itemNotFound": {"code": 404, "message": "Instance could not be found."}}"#
            ),
            "Instance could not be found."
        );
        assert_eq!(error_message("<html>502</html>\n"), "<html>502</html>");
        assert_eq!(error_message(r#"{"foo": "bar"}"#), r#"{"foo": "bar"}"#);
    }

    #[test]
    fn take_field() {
        let name: String = take(json!({"network": "net-a"}), "network").unwrap();
        assert_eq!(name, "net-a");
        assert!(matches!(
            take::<String>(json!({"port": "p"}), "network"),
            Err(Error::MissingField(_))
        ));
    }
}
