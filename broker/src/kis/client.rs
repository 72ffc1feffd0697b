//! Blocking HTTP transport for the brokerage open API.

use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

use super::types::{Envelope, classify};
use crate::error::BrokerError;
use crate::types::Reply;

/// Blocking REST client carrying app credentials and the request timeout.
#[derive(Clone)]
pub struct KisClient {
    http: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
}

impl KisClient {
    pub fn new(
        base_url: &str,
        app_key: &str,
        app_secret: &str,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
        })
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Unauthenticated JSON POST (token issuance).
    pub fn post_plain(&self, path: &str, body: &Value) -> Result<(u16, String), BrokerError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|e| BrokerError::Connection(format!("{path} request failed: {e}")))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .map_err(|e| BrokerError::Connection(format!("{path} body unreadable: {e}")))?;
        Ok((status, text))
    }

    /// Authenticated GET.
    pub fn get(
        &self,
        token: &str,
        path: &str,
        tr_id: &str,
        query: &[(&str, &str)],
    ) -> Result<Reply<Envelope>, BrokerError> {
        debug!("GET {path} ({tr_id})");
        let req = self.http.get(self.url(path)).query(query);
        self.send(self.headers(req, token, tr_id), path)
    }

    /// Authenticated JSON POST.
    pub fn post(
        &self,
        token: &str,
        path: &str,
        tr_id: &str,
        body: &Value,
    ) -> Result<Reply<Envelope>, BrokerError> {
        debug!("POST {path} ({tr_id})");
        let req = self.http.post(self.url(path)).json(body);
        self.send(self.headers(req, token, tr_id), path)
    }

    fn headers(&self, req: RequestBuilder, token: &str, tr_id: &str) -> RequestBuilder {
        req.header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.app_key)
            .header("appsecret", &self.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P")
    }

    fn send(&self, req: RequestBuilder, path: &str) -> Result<Reply<Envelope>, BrokerError> {
        let resp = req
            .send()
            .map_err(|e| BrokerError::Connection(format!("{path} request failed: {e}")))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .map_err(|e| BrokerError::Connection(format!("{path} body unreadable: {e}")))?;
        classify(status, &text)
    }
}
