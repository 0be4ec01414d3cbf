//! Purpose: Provide a blocking HTTP client for the notes API.
//! Exports: `NotesClient`.
//! Role: Mirrors what a browser front end does: list, fetch, create, delete.
//! Invariants: The not-found message body maps to `Ok(None)`, never an error.
//! Invariants: Error envelopes map back to their `ErrorKind`; transport failures are `Io`.
//! Invariants: TLS trust is either the platform roots, one PEM file, or explicitly disabled.
#![allow(clippy::result_large_err)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use ureq::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use ureq::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use ureq::rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use url::Url;

use super::wire::{DeletedBody, ErrorEnvelope, MessageBody, NOTE_NOT_FOUND, parse_error_kind};
use crate::core::error::{Error, ErrorKind};
use crate::core::note::{NewNote, Note, NoteId};

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct NotesClient {
    inner: Arc<NotesClientInner>,
}

struct NotesClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

/// Accepts any server certificate; only reachable through `with_tls_skip_verify`.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ureq::rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NoteOrMessage {
    Note(Note),
    Message(MessageBody),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeletedOrMessage {
    Deleted(DeletedBody),
    Message(MessageBody),
}

impl NotesClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(NotesClientInner { base_url, agent }),
        })
    }

    /// Trusts only the certificates in a PEM file, e.g. the one written by
    /// `serve --tls-self-signed --tls-cert-out`.
    pub fn with_tls_ca_file(self, path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let cert_bytes = std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to read TLS CA/certificate file")
                .with_path(path)
                .with_source(err)
        })?;
        let certs = rustls_pemfile::certs(&mut Cursor::new(cert_bytes))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message("failed to parse TLS CA/certificate file")
                    .with_path(path)
                    .with_source(err)
            })?;
        if certs.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("TLS CA/certificate file contains no certificates")
                .with_path(path));
        }

        let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
        let mut root_store = ureq::rustls::RootCertStore::empty();
        let (added, _) = root_store.add_parsable_certificates(certs);
        if added == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("TLS CA/certificate file contains no parsable certificates")
                .with_path(path));
        }

        let tls_config = ureq::rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let agent = ureq::builder().tls_config(Arc::new(tls_config)).build();
        Ok(self.with_agent(agent))
    }

    pub fn with_tls_skip_verify(self) -> Self {
        let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
        let tls_config = ureq::rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_no_client_auth();
        let agent = ureq::builder().tls_config(Arc::new(tls_config)).build();
        self.with_agent(agent)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn welcome(&self) -> ApiResult<String> {
        let url = build_url(&self.inner.base_url, &[])?;
        let body: MessageBody = self.request_json("GET", &url, None)?;
        Ok(body.message)
    }

    pub fn list_notes(&self) -> ApiResult<Vec<Note>> {
        let url = build_url(&self.inner.base_url, &["notes"])?;
        self.request_json("GET", &url, None)
    }

    pub fn get_note(&self, id: &NoteId) -> ApiResult<Option<Note>> {
        let url = build_url(&self.inner.base_url, &["notes", &id.to_string()])?;
        match self.request_json::<NoteOrMessage>("GET", &url, None)? {
            NoteOrMessage::Note(note) => Ok(Some(note)),
            NoteOrMessage::Message(body) => not_found_or_unexpected(body),
        }
    }

    pub fn create_note(&self, text: impl Into<String>) -> ApiResult<Note> {
        let url = build_url(&self.inner.base_url, &["notes"])?;
        let payload = serde_json::to_string(&NewNote::new(text)).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        self.request_json("POST", &url, Some(&payload))
    }

    pub fn delete_note(&self, id: &NoteId) -> ApiResult<Option<Note>> {
        let url = build_url(&self.inner.base_url, &["notes", &id.to_string()])?;
        match self.request_json::<DeletedOrMessage>("DELETE", &url, None)? {
            DeletedOrMessage::Deleted(body) => Ok(Some(body.deleted_note)),
            DeletedOrMessage::Message(body) => not_found_or_unexpected(body),
        }
    }

    fn with_agent(mut self, agent: ureq::Agent) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.agent = agent,
            None => {
                self.inner = Arc::new(NotesClientInner {
                    base_url: self.inner.base_url.clone(),
                    agent,
                });
            }
        }
        self
    }

    fn request_json<R>(&self, method: &str, url: &Url, payload: Option<&str>) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = match payload {
            Some(payload) => request
                .set("Content-Type", "application/json")
                .send_string(payload),
            None => request.call(),
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message(format!("request to {} failed", self.inner.base_url))
                .with_source(err)),
        }
    }
}

fn not_found_or_unexpected<T>(body: MessageBody) -> ApiResult<Option<T>> {
    if body.message == NOTE_NOT_FOUND {
        Ok(None)
    } else {
        Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("unexpected response message: {}", body.message)))
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid api base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("api base url must use http or https scheme")
            .with_hint("Use a value like http://127.0.0.1:8000."));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("api base url must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("api base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let mut err = Error::new(parse_error_kind(&envelope.error.kind))
            .with_message(envelope.error.message);
        if let Some(hint) = envelope.error.hint {
            err = err.with_hint(hint);
        }
        return err;
    }
    let message = body.trim();
    let err = Error::new(error_kind_from_status(status));
    if message.is_empty() {
        err.with_message(format!("api error status {status}"))
    } else {
        err.with_message(format!("api error status {status}: {message}"))
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 415 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        423 => ErrorKind::Busy,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DeletedOrMessage, NoteOrMessage, NotesClient, build_url, error_kind_from_status,
        normalize_base_url,
    };
    use crate::core::error::ErrorKind;
    use crate::core::note::NoteId;

    #[test]
    fn normalize_base_url_keeps_host_and_port() {
        let url = normalize_base_url("http://localhost:8000".to_string()).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8000/");
    }

    #[test]
    fn normalize_base_url_rejects_paths_and_schemes() {
        let err = normalize_base_url("http://localhost:8000/notes".to_string()).expect_err("path");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = normalize_base_url("ftp://localhost".to_string()).expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn tls_ca_file_rejects_missing_and_empty_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = NotesClient::new("https://127.0.0.1:8443").expect("client");

        let missing = temp.path().join("missing.pem");
        let err = client.clone().with_tls_ca_file(&missing).err().expect("missing");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.path(), Some(missing.as_path()));

        let empty = temp.path().join("empty.pem");
        std::fs::write(&empty, "").expect("write");
        let err = client.with_tls_ca_file(&empty).err().expect("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn tls_skip_verify_keeps_base_url() {
        let client = NotesClient::new("https://127.0.0.1:8443")
            .expect("client")
            .with_tls_skip_verify();
        assert_eq!(client.base_url().as_str(), "https://127.0.0.1:8443/");
    }

    #[test]
    fn build_url_escapes_ids() {
        let base = normalize_base_url("https://localhost:8443".to_string()).expect("url");
        let url = build_url(&base, &["notes", "a b"]).expect("url");
        assert_eq!(url.as_str(), "https://localhost:8443/notes/a%20b");
    }

    #[test]
    fn bodies_distinguish_notes_from_messages() {
        let note: NoteOrMessage =
            serde_json::from_str(r#"{"id": 3, "text": "x"}"#).expect("note");
        assert!(matches!(note, NoteOrMessage::Note(n) if n.id == NoteId::Seq(3)));

        let missing: NoteOrMessage =
            serde_json::from_str(r#"{"message": "Note not found"}"#).expect("message");
        assert!(matches!(missing, NoteOrMessage::Message(_)));

        let deleted: DeletedOrMessage = serde_json::from_str(
            r#"{"message": "Note with id 1 has been deleted", "deleted_note": {"id": 1, "text": "x"}}"#,
        )
        .expect("deleted");
        assert!(matches!(deleted, DeletedOrMessage::Deleted(_)));
    }

    #[test]
    fn status_fallbacks() {
        assert_eq!(error_kind_from_status(422), ErrorKind::Usage);
        assert_eq!(error_kind_from_status(503), ErrorKind::Internal);
        assert_eq!(error_kind_from_status(302), ErrorKind::Io);
    }
}
