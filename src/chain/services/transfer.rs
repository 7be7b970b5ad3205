//! Final stage: turn the loaded resource into the response.

use axum::http::{Method, StatusCode};

use crate::chain::context::{keys, ChainContext};
use crate::chain::service::{Service, ServiceId, ServiceResult};
use crate::http::response::Response;

pub struct TransferResponse {
    cookie_name: String,
}

impl TransferResponse {
    pub fn new(cookie_name: String) -> Self {
        Self { cookie_name }
    }
}

impl Service for TransferResponse {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let Some(resource) = ctx.remove::<keys::Resource>() else {
            return ServiceResult::error(&ServiceId::TRANSFER_RESPONSE, "no resource loaded");
        };

        let mut response = Response::new(StatusCode::OK)
            .with_header("Content-Type", resource.content_type)
            .with_body(resource.body);
        response.head_only = ctx.request().method == Method::HEAD;

        if let Some(binding) = ctx.get::<keys::Session>().filter(|b| b.created) {
            let mut cookie = format!("{}={}; Path=/; HttpOnly", self.cookie_name, binding.session.id);
            if ctx.connection().secure {
                cookie.push_str("; Secure");
            }
            response = response.with_header("Set-Cookie", cookie);
        }

        ServiceResult::Abort(response)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::*;
    use crate::chain::services::resource::LoadedResource;
    use crate::chain::services::testing::{context, request};
    use crate::domain::tests::test_domain;
    use crate::http::request::HttpVersion;
    use crate::session::{SessionBinding, SessionRef};

    fn loaded() -> LoadedResource {
        LoadedResource {
            path: PathBuf::from("/srv/index.html"),
            content_type: "text/html; charset=utf-8",
            body: b"<h1>hi</h1>".to_vec(),
        }
    }

    fn binding(created: bool) -> SessionBinding {
        SessionBinding {
            session: SessionRef {
                id: Uuid::new_v4(),
                domain: "shop".into(),
            },
            created,
        }
    }

    #[test]
    fn new_sessions_set_a_cookie() {
        let service = TransferResponse::new("VHSESSION".into());
        let mut ctx = context(request(Method::GET, "/", &[], b""), test_domain("shop", "/srv"));
        ctx.insert::<keys::Resource>(loaded());
        let session = binding(true);
        ctx.insert::<keys::Session>(session.clone());

        let ServiceResult::Abort(response) = service.execute(&mut ctx) else {
            panic!("expected a response");
        };
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"<h1>hi</h1>");
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(
            response.header("set-cookie").map(str::to_string),
            Some(format!("VHSESSION={}; Path=/; HttpOnly", session.session.id))
        );

        let wire = String::from_utf8(response.to_bytes(HttpVersion::Http11, true)).unwrap();
        assert!(wire.contains("\r\nContent-Type: text/html; charset=utf-8\r\n"), "{}", wire);
        assert!(wire.contains("\r\nSet-Cookie: VHSESSION="), "{}", wire);
    }

    #[test]
    fn existing_sessions_and_head_requests() {
        let service = TransferResponse::new("VHSESSION".into());
        let mut ctx = context(request(Method::HEAD, "/", &[], b""), test_domain("shop", "/srv"));
        ctx.insert::<keys::Resource>(loaded());
        ctx.insert::<keys::Session>(binding(false));

        let ServiceResult::Abort(response) = service.execute(&mut ctx) else {
            panic!("expected a response");
        };
        assert!(response.head_only);
        assert_eq!(response.header("set-cookie"), None);
    }

    #[test]
    fn missing_resource_is_an_error() {
        let service = TransferResponse::new("VHSESSION".into());
        let mut ctx = context(request(Method::GET, "/", &[], b""), test_domain("shop", "/srv"));
        assert_eq!(
            service.execute(&mut ctx),
            ServiceResult::Error {
                service: "transfer-response".into(),
                detail: "no resource loaded".into()
            }
        );
    }
}
