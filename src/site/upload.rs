use crate::config::{Credentials, SiteConfig};
use crate::models::{UploadOutcome, UploadRequest};
use crate::site::parsers::{extract_error_messages, extract_link_by_exact_text, extract_token};
use crate::site::session::{Session, SessionManager};
use crate::site::{SiteError, Uploader, TOKEN_FIELD, UPLOAD_PATH};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

const DUPLICATE_NAME_PHRASE: &str = "instant with this name already exists";
const FILE_SIZE_PHRASE: &str = "please keep filesize under";
const DEFAULT_COLOR: &str = "00FF00";

/// Map the form's error list onto domain failures, duplicate name first.
pub fn classify_errors(messages: &[String]) -> Option<SiteError> {
    let joined = messages.join("\n").to_lowercase();
    if joined.contains(DUPLICATE_NAME_PHRASE) {
        Some(SiteError::NameAlreadyExists)
    } else if joined.contains(FILE_SIZE_PHRASE) {
        Some(SiteError::FileSizeExceeded)
    } else {
        None
    }
}

/// Posts the "new instant" form on an authenticated session.
pub struct Submitter;

impl Submitter {
    pub async fn submit(
        &self,
        session: &mut Session,
        request: &UploadRequest,
    ) -> Result<UploadOutcome, SiteError> {
        if !session.is_authenticated() {
            return Err(SiteError::Login);
        }
        let upload_url = session.client.url(UPLOAD_PATH)?;

        // The upload form carries its own token.
        debug!("GET {}", upload_url);
        let html = session.client.get(upload_url.clone()).send().await?.text().await?;
        let token = extract_token(&html, TOKEN_FIELD)
            .ok_or(SiteError::InvalidPage("upload form has no anti-forgery token"))?;
        session.refresh_token(token);

        let audio = tokio::fs::read(&request.audio_path).await?;
        debug!(
            "Uploading {:?} ({} bytes) as {:?}",
            request.audio_path,
            audio.len(),
            request.display_name
        );

        let sound = Part::bytes(audio)
            .file_name(request.file_name())
            .mime_str(request.content_type)?;
        let image = Part::bytes(Vec::new()).file_name("");

        let form = Form::new()
            .text(TOKEN_FIELD, session.token().to_string())
            .text("name", request.display_name.clone())
            .part("sound", sound)
            .part("image", image)
            .text("color", DEFAULT_COLOR)
            .text("category", "")
            .text("description", "")
            .text("tags", "")
            .text("accept_terms", "on");

        let resp = session
            .client
            .post(upload_url.clone())
            .header(reqwest::header::REFERER, upload_url.as_str())
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let landing = resp.url().clone();
        let html = resp.text().await?;

        let errors = extract_error_messages(&html);
        if let Some(err) = classify_errors(&errors) {
            info!("Upload of {:?} refused: {}", request.display_name, err);
            return Err(err);
        }
        if status != StatusCode::OK {
            warn!("Upload answered {} ({} form errors)", status, errors.len());
            return Err(SiteError::Http(status));
        }

        match extract_link_by_exact_text(&html, &request.display_name) {
            Some(href) => {
                let link = landing.join(&href).map_err(|e| {
                    SiteError::Unexpected(format!("bad instant link {:?}: {}", href, e))
                })?;
                info!("Uploaded {:?}: {}", request.display_name, link);
                Ok(UploadOutcome::Confirmed(link.to_string()))
            }
            None => {
                warn!(
                    "Upload of {:?} accepted but no link found, landing on {}",
                    request.display_name, landing
                );
                Ok(UploadOutcome::Unconfirmed(landing.to_string()))
            }
        }
    }
}

/// Full upload attempt against the live site: fresh login, then submit.
pub struct SiteUploader {
    sessions: SessionManager,
    credentials: Credentials,
}

impl SiteUploader {
    pub fn new(config: &SiteConfig, credentials: Credentials) -> Self {
        Self {
            sessions: SessionManager::new(config),
            credentials,
        }
    }
}

#[async_trait]
impl Uploader for SiteUploader {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome, SiteError> {
        let mut session = self.sessions.login(&self.credentials).await?;
        debug!("Session landed on {}", session.landing());
        Submitter.submit(&mut session, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRequest, FakeResponse, FakeSite};
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    fn form(token: &str) -> String {
        format!(r#"<form><input type="hidden" name="csrfmiddlewaretoken" value="{}"></form>"#, token)
    }

    /// Login flow that lands on `/new/`, with `on_upload` answering the POST.
    async fn site<F>(on_upload: F) -> FakeSite
    where
        F: Fn(&FakeRequest) -> FakeResponse + Send + Sync + 'static,
    {
        FakeSite::start(move |req| match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/accounts/login/") => FakeResponse::html(200, form("login-token")),
            ("POST", "/accounts/login/") => {
                FakeResponse::redirect("/new/").with_header("Set-Cookie", "sessionid=s1; Path=/")
            }
            ("GET", "/new/") => FakeResponse::html(200, form("upload-token")),
            ("POST", "/new/") => on_upload(req),
            _ => FakeResponse::html(404, ""),
        })
        .await
    }

    fn uploader(base_url: &str) -> SiteUploader {
        let cfg = SiteConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            ..SiteConfig::default()
        };
        SiteUploader::new(&cfg, Credentials::new("alice", "s3cret"))
    }

    fn audio_file(bytes: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(&vec![7u8; bytes]).unwrap();
        file
    }

    #[test]
    fn test_classify_priority() {
        let both = vec![
            "Please keep filesize under 300.0 KB".to_string(),
            "Instant with this Name already exists.".to_string(),
        ];
        assert!(matches!(classify_errors(&both), Some(SiteError::NameAlreadyExists)));
        let size = vec!["please keep filesize under 300.0 kb".to_string()];
        assert!(matches!(classify_errors(&size), Some(SiteError::FileSizeExceeded)));
        assert!(classify_errors(&["This field is required.".to_string()]).is_none());
    }

    #[tokio::test]
    async fn test_upload_confirmed_link() {
        let site = site(|_| {
            FakeResponse::html(
                200,
                r#"<a class="instant-link" href="/instants/other/">other</a>
                   <a class="instant-link" href="/instants/test-clip/">test-clip</a>"#,
            )
        })
        .await;
        let file = audio_file(10 * 1024);
        let request = UploadRequest::new("test-clip", file.path());

        let outcome = assert_ok!(uploader(&site.base_url).upload(&request).await);
        assert_eq!(
            outcome,
            UploadOutcome::Confirmed(format!("{}/instants/test-clip/", site.base_url))
        );

        let requests = site.requests();
        let post = requests
            .iter()
            .find(|r| r.method == "POST" && r.path == "/new/")
            .unwrap();
        assert_eq!(post.header("referer"), Some(format!("{}/new/", site.base_url).as_str()));
        assert!(post.header("cookie").is_some_and(|c| c.contains("sessionid=s1")));
        assert!(post
            .header("content-type")
            .is_some_and(|c| c.starts_with("multipart/form-data")));

        let body = post.body_text();
        assert!(body.contains("upload-token"));
        assert!(!body.contains("login-token"));
        assert!(body.contains(r#"name="name""#));
        assert!(body.contains("test-clip"));
        assert!(body.contains(r#"name="sound""#));
        assert!(body.to_lowercase().contains("content-type: audio/mpeg"));
        let image = body
            .split_once(r#"name="image""#)
            .map(|(_, rest)| rest.split("--").next().unwrap_or_default())
            .unwrap();
        assert!(!image.to_lowercase().contains("content-type"));
        assert!(body.contains(r#"name="accept_terms""#));
        assert!(body.contains("00FF00"));
        assert!(post.body.len() > 10 * 1024);
    }

    #[tokio::test]
    async fn test_upload_unconfirmed_falls_back_to_landing() {
        let site = site(|_| FakeResponse::html(200, "<p>Thanks!</p>")).await;
        let file = audio_file(64);
        let request = UploadRequest::new("mystery", file.path());

        let outcome = assert_ok!(uploader(&site.base_url).upload(&request).await);
        assert_eq!(outcome, UploadOutcome::Unconfirmed(format!("{}/new/", site.base_url)));
    }

    #[tokio::test]
    async fn test_upload_duplicate_name() {
        let site = site(|_| {
            FakeResponse::html(
                200,
                r#"<ul class="errorlist"><li>Instant with this Name already exists.</li></ul>"#,
            )
        })
        .await;
        let file = audio_file(64);
        let err = assert_err!(uploader(&site.base_url).upload(&UploadRequest::new("dup", file.path())).await);
        assert!(matches!(err, SiteError::NameAlreadyExists));
    }

    #[tokio::test]
    async fn test_upload_file_size_even_on_error_status() {
        let site = site(|_| {
            FakeResponse::html(
                400,
                r#"<ul class="errorlist"><li>Please keep filesize under 300.0 KB</li></ul>"#,
            )
        })
        .await;
        let file = audio_file(64);
        let err = assert_err!(uploader(&site.base_url).upload(&UploadRequest::new("big", file.path())).await);
        assert!(matches!(err, SiteError::FileSizeExceeded));
    }

    #[tokio::test]
    async fn test_upload_unclassified_error_status() {
        let site = site(|_| FakeResponse::html(500, "<h1>Server Error</h1>")).await;
        let file = audio_file(64);
        let err = assert_err!(uploader(&site.base_url).upload(&UploadRequest::new("x", file.path())).await);
        assert!(matches!(err, SiteError::Http(s) if s == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_upload_page_without_token() {
        let site = FakeSite::start(|req| match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/accounts/login/") => FakeResponse::html(200, form("login-token")),
            ("POST", "/accounts/login/") => FakeResponse::redirect("/new/"),
            _ => FakeResponse::html(200, "<p>no form</p>"),
        })
        .await;
        let file = audio_file(64);
        let err = assert_err!(uploader(&site.base_url).upload(&UploadRequest::new("x", file.path())).await);
        assert!(matches!(err, SiteError::InvalidPage(_)));
        assert!(!site.requests().iter().any(|r| r.method == "POST" && r.path == "/new/"));
    }
}
