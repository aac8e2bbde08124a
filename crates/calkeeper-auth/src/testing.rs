//! Scripted [`OAuthClient`] for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AuthError, AuthResult};
use crate::oauth::{BoxFuture, OAuthClient, PkceFlow};
use crate::record::CredentialRecord;

#[derive(Default)]
pub(crate) struct MockOAuthClient {
    refresh_results: Mutex<VecDeque<AuthResult<CredentialRecord>>>,
    exchange_results: Mutex<VecDeque<AuthResult<CredentialRecord>>>,
    refresh_calls: AtomicUsize,
    exchanged: Mutex<Vec<(String, String)>>,
    applied: Mutex<Option<CredentialRecord>>,
}

impl MockOAuthClient {
    pub(crate) fn push_refresh(&self, result: AuthResult<CredentialRecord>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_exchange(&self, result: AuthResult<CredentialRecord>) {
        self.exchange_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Codes passed to `exchange_code`, in call order.
    pub(crate) fn exchanged_codes(&self) -> Vec<String> {
        self.exchanged
            .lock()
            .unwrap()
            .iter()
            .map(|(code, _)| code.clone())
            .collect()
    }

    pub(crate) fn applied(&self) -> Option<CredentialRecord> {
        self.applied.lock().unwrap().clone()
    }
}

impl OAuthClient for MockOAuthClient {
    fn authorization_url(&self, scopes: &[String], pkce: &PkceFlow) -> String {
        format!(
            "https://auth.invalid/authorize?scope={}&state={}",
            urlencoding::encode(&scopes.join(" ")),
            pkce.state
        )
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        pkce_verifier: &'a str,
    ) -> BoxFuture<'a, AuthResult<CredentialRecord>> {
        Box::pin(async move {
            self.exchanged
                .lock()
                .unwrap()
                .push((code.to_string(), pkce_verifier.to_string()));
            self.exchange_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AuthError::authorization("no scripted exchange")))
        })
    }

    fn refresh<'a>(
        &'a self,
        _current: &'a CredentialRecord,
    ) -> BoxFuture<'a, AuthResult<CredentialRecord>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AuthError::refresh_failed("no scripted refresh")))
        })
    }

    fn set_credentials(&self, record: Option<&CredentialRecord>) {
        *self.applied.lock().unwrap() = record.cloned();
    }
}
