use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;

use super::mail_models::{MailRequest, OutboundMessage};
use super::mail_service::MailError;

/// Resolves `.` and `..` purely lexically, the filesystem is never consulted.
/// `..` at the root stays at the root; leading `..` on a relative path is kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Returns the normalized path if it sits under `safe_root`, otherwise refuses it.
pub fn guard_attachment_path(path: &Path, safe_root: &Path) -> Result<PathBuf, MailError> {
    let normalized = normalize_path(path);
    let root = normalize_path(safe_root);

    if !normalized.starts_with(&root) || normalized.file_name().is_none() {
        tracing::error!(
            "Attempted to attach file outside safe directory {}: {}",
            root.display(),
            path.display()
        );
        return Err(MailError::UnsafeAttachmentPath(path.to_path_buf()));
    }

    Ok(normalized)
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.trim().parse::<Mailbox>().map_err(|e| {
        tracing::error!("Invalid email address {:?}: {}", address, e);
        MailError::InvalidAddress(address.to_string())
    })
}

/// Builds the multipart message and its wire encoding.
///
/// Every attachment path is checked before any file is opened, so a single bad
/// path means nothing is read at all. The request's sender must already be a real
/// address; the `me` sentinel is resolved by the service.
pub async fn compose(request: &MailRequest, safe_root: &Path) -> Result<OutboundMessage, MailError> {
    let safe_paths = request
        .attachments
        .iter()
        .map(|path| guard_attachment_path(path, safe_root))
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = Message::builder()
        .from(parse_mailbox(&request.sender)?)
        .subject(request.subject.as_str());
    for recipient in &request.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(request.body.clone()));

    if !safe_paths.is_empty() {
        tracing::info!("Using safe root directory: {}", safe_root.display());
        let octet_stream = ContentType::parse("application/octet-stream")
            .map_err(|e| MailError::Compose(e.to_string()))?;

        for path in &safe_paths {
            let contents = tokio::fs::read(path).await.map_err(|source| {
                tracing::error!("Failed to read attachment {}: {}", path.display(), source);
                MailError::AttachmentRead {
                    path: path.clone(),
                    source,
                }
            })?;

            // The guard rejects paths without a final component.
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            parts = parts.singlepart(Attachment::new(filename).body(contents, octet_stream.clone()));
        }
    }

    let message = builder.multipart(parts).map_err(|e| {
        tracing::error!("Failed to build MIME message: {}", e);
        MailError::Compose(e.to_string())
    })?;

    Ok(OutboundMessage {
        recipients: request.recipients.clone(),
        subject: request.subject.clone(),
        raw: URL_SAFE.encode(message.formatted()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailparse::{DispositionType, MailHeaderMap};

    fn request(attachments: Vec<PathBuf>) -> MailRequest {
        MailRequest {
            sender: "robot@example.com".into(),
            recipients: vec!["a@x.com".into(), "b@x.com".into()],
            subject: "Nightly report".into(),
            body: "Processing finished.".into(),
            attachments,
        }
    }

    fn decode(message: &OutboundMessage) -> Vec<u8> {
        URL_SAFE.decode(message.raw()).unwrap()
    }

    #[test]
    fn normalize_resolves_dot_segments() {
        assert_eq!(
            normalize_path(Path::new("/tmp/jobs/./out/../report.pdf")),
            PathBuf::from("/tmp/jobs/report.pdf")
        );
        assert_eq!(
            normalize_path(Path::new("/tmp/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(normalize_path(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn guard_rejects_traversal_out_of_root() {
        let root = Path::new("/srv/outbox");
        let err = guard_attachment_path(Path::new("/srv/outbox/../secrets.txt"), root).unwrap_err();
        assert!(matches!(err, MailError::UnsafeAttachmentPath(_)));
    }

    #[test]
    fn guard_compares_whole_components() {
        let root = Path::new("/srv/outbox");
        assert!(guard_attachment_path(Path::new("/srv/outbox-evil/x.pdf"), root).is_err());
        assert!(guard_attachment_path(Path::new("relative.pdf"), root).is_err());
        assert_eq!(
            guard_attachment_path(Path::new("/srv/outbox/./x.pdf"), root).unwrap(),
            PathBuf::from("/srv/outbox/x.pdf")
        );
    }

    #[tokio::test]
    async fn compose_round_trips_headers_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let message = compose(&request(Vec::new()), dir.path()).await.unwrap();

        let bytes = decode(&message);
        let parsed = mailparse::parse_mail(&bytes).unwrap();

        assert_eq!(
            parsed.headers.get_first_value("Subject").as_deref(),
            Some("Nightly report")
        );
        assert_eq!(
            parsed.headers.get_first_value("From").as_deref(),
            Some("robot@example.com")
        );
        assert_eq!(
            parsed.headers.get_first_value("To").as_deref(),
            Some("a@x.com, b@x.com")
        );
        assert_eq!(message.to_header(), "a@x.com, b@x.com");

        assert_eq!(parsed.subparts.len(), 1);
        let text = &parsed.subparts[0];
        assert_eq!(text.ctype.mimetype, "text/plain");
        assert_eq!(text.get_body().unwrap().trim_end(), "Processing finished.");
    }

    #[tokio::test]
    async fn compose_attaches_file_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.pdf");
        std::fs::write(&file, b"%PDF-1.7 fake").unwrap();

        let message = compose(&request(vec![file]), dir.path())
            .await
            .unwrap();

        let bytes = decode(&message);
        let parsed = mailparse::parse_mail(&bytes).unwrap();
        assert_eq!(parsed.subparts.len(), 2);

        let attachment = &parsed.subparts[1];
        let disposition = attachment.get_content_disposition();
        assert_eq!(disposition.disposition, DispositionType::Attachment);
        assert_eq!(
            disposition.params.get("filename").map(String::as_str),
            Some("out.pdf")
        );
        let contents = attachment.get_body_raw().unwrap();
        assert_eq!(String::from_utf8_lossy(&contents).trim_end(), "%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn compose_rejects_unsafe_path_before_reading_anything() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("ok.txt");
        std::fs::write(&inside, b"fine").unwrap();
        // The escaping path does not exist; hitting the filesystem would surface
        // AttachmentRead instead of the guard error.
        let escaping = dir.path().join("..").join("..").join("nope").join("shadow");

        let err = compose(&request(vec![inside, escaping]), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::UnsafeAttachmentPath(_)));
    }

    #[tokio::test]
    async fn compose_reports_missing_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pdf");

        let err = compose(&request(vec![missing]), dir.path()).await.unwrap_err();
        assert!(matches!(err, MailError::AttachmentRead { .. }));
    }

    #[tokio::test]
    async fn compose_rejects_bad_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(Vec::new());
        req.recipients.push("not an address".into());

        let err = compose(&req, dir.path()).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress(ref a) if a == "not an address"));
    }
}
