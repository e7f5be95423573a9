//! Outbound request description.
//!
//! Requests are plain data so the client can re-issue the identical call
//! after a token refresh.

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Serialize;
use tracing::warn;

/// Endpoint paths the client treats specially.
pub mod paths {
    pub const LOGIN: &str = "/auth/login";
    pub const REGISTER: &str = "/auth/register";
    pub const REFRESH: &str = "/auth/refresh";
    pub const LOGOUT: &str = "/auth/logout";
    pub const PROFILE: &str = "/auth/profile";
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    /// Pre-serialized JSON document.
    Json(Vec<u8>),
    /// Sent without the JSON content type.
    Multipart(MultipartForm),
}

/// A REST call relative to the configured base address.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn with_json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, serde_json::Error> {
        Ok(Self {
            body: RequestBody::Json(serde_json::to_vec(body)?),
            ..self
        })
    }

    pub fn with_multipart(self, form: MultipartForm) -> Self {
        Self {
            body: RequestBody::Multipart(form),
            ..self
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// A 401 from the refresh or login endpoint is final.
    pub(crate) fn allows_refresh(&self) -> bool {
        !self.endpoint.contains(paths::REFRESH) && !self.endpoint.contains(paths::LOGIN)
    }
}

#[derive(Debug, Clone)]
enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Rebuildable multipart body. `reqwest`'s form is consumed on send, so
/// the parts are kept here and turned into a fresh form per attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.map(str::to_string),
            bytes,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn to_form(&self) -> Form {
        self.parts.iter().fold(Form::new(), |form, part| match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let file_part = || Part::bytes(bytes.clone()).file_name(file_name.clone());
                let part = match mime {
                    Some(mime) => file_part().mime_str(mime).unwrap_or_else(|e| {
                        warn!(mime = %mime, error = %e, "Ignoring invalid MIME type");
                        file_part()
                    }),
                    None => file_part(),
                };
                form.part(name.clone(), part)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_and_login_never_trigger_refresh() {
        assert!(!ApiRequest::post(paths::LOGIN).allows_refresh());
        assert!(!ApiRequest::post(paths::REFRESH).allows_refresh());
        assert!(ApiRequest::post(paths::LOGOUT).allows_refresh());
        assert!(ApiRequest::get("/transactions").allows_refresh());
    }

    #[test]
    fn test_json_body_is_preserialized() {
        let request = ApiRequest::post("/payment/calculate-fee")
            .with_json(&serde_json::json!({"amount": 10000, "code": "QRIS"}))
            .unwrap();
        match request.body() {
            RequestBody::Json(bytes) => {
                let value: serde_json::Value = serde_json::from_slice(bytes).unwrap();
                assert_eq!(value["code"], "QRIS");
            }
            other => panic!("expected JSON body, got {:?}", other),
        }
    }

    #[test]
    fn test_multipart_form_is_rebuildable() {
        let form = MultipartForm::new()
            .file("file", "icon.png", Some("image/png"), vec![1, 2, 3])
            .text("folder", "games");
        assert_eq!(form.len(), 2);

        let request = ApiRequest::post("/upload/image").with_multipart(form);
        let again = request.clone();
        for req in [request, again] {
            match req.body() {
                RequestBody::Multipart(form) => {
                    let _ = form.to_form();
                }
                other => panic!("expected multipart body, got {:?}", other),
            }
        }
    }
}
