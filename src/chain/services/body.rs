//! Body stages: completeness check and form decoding.

use axum::http::{header, StatusCode};
use url::form_urlencoded;

use crate::chain::context::{keys, ChainContext};
use crate::chain::service::{Service, ServiceResult};
use crate::http::response::Response;

/// Decoded form fields, query string first, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn extend_from(&mut self, encoded: &[u8]) {
        self.fields.extend(form_urlencoded::parse(encoded).into_owned());
    }
}

pub struct RequireCompleteBody;

impl Service for RequireCompleteBody {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let request = ctx.request();
        // Chunked framing wins over Content-Length.
        if request.header(header::TRANSFER_ENCODING.as_str()).is_some() {
            return ServiceResult::Next;
        }
        match request.content_length() {
            Some(declared) if declared != request.body.len() => {
                ServiceResult::Abort(Response::status_page(StatusCode::BAD_REQUEST))
            }
            _ => ServiceResult::Next,
        }
    }
}

pub struct DecodeForm;

impl Service for DecodeForm {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let request = ctx.request();
        let mut form = FormData::default();

        if let Some(query) = request.query() {
            form.extend_from(query.as_bytes());
        }

        let urlencoded = request
            .header(header::CONTENT_TYPE.as_str())
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"));
        if urlencoded {
            form.extend_from(&request.body);
        }

        ctx.insert::<keys::FormFields>(form);
        ServiceResult::Next
    }
}
