use chrono::Utc;

use crate::api::{self, BlobStore, ContentItem, ContentKind, Db, Error, ItemId, NewItem, Uuid};

/// Where the bytes of a video come from
#[derive(Clone, Debug)]
pub enum VideoSource {
    Link(String),
    Upload(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct VideoDraft {
    pub title: String,
    pub description: String,
    pub transcript: Option<String>,

    /// An uploaded file wins over a link if both got provided
    pub link: Option<String>,
    pub file: Option<Vec<u8>>,
}

impl VideoDraft {
    fn source(self) -> Option<VideoSource> {
        match (self.file, self.link) {
            (Some(bytes), _) => Some(VideoSource::Upload(bytes)),
            (None, Some(link)) if !link.trim().is_empty() => {
                Some(VideoSource::Link(String::from(link.trim())))
            }
            (None, _) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EbookDraft {
    pub title: String,
    pub description: String,
    pub pdf: Option<Vec<u8>>,
    pub cover: Option<Vec<u8>>,
}

pub fn video_blob_path(id: &ItemId) -> String {
    format!("videos/{}", id.0)
}

pub fn ebook_blob_path(id: &ItemId) -> String {
    format!("ebooks/{}", id.0)
}

pub fn cover_blob_path(id: &ItemId) -> String {
    format!("ebookImages/{}", id.0)
}

/// Checks the current user may publish, returning the item skeleton
fn new_item<D: Db>(
    db: &D,
    kind: ContentKind,
    title: &str,
    description: &str,
) -> Result<NewItem, Error> {
    let user = db.current_user().ok_or(Error::AuthenticationRequired)?;
    if !user.role.can_publish() {
        return Err(Error::PermissionDenied);
    }
    api::validate_text(title)?;
    api::validate_text(description)?;
    Ok(NewItem {
        id: ItemId(Uuid::new_v4()),
        kind,
        owner_id: user.id,
        owner_name: user.display_name,
        date: Utc::now(),
        title: String::from(title.trim()),
        description: String::from(description),
        url: String::new(),
        image_url: None,
        transcript: None,
    })
}

async fn upload<B: BlobStore>(blobs: &mut B, path: &str, bytes: Vec<u8>) -> Result<String, Error> {
    tracing::debug!(path, len = bytes.len(), "uploading blob");
    let handle = blobs.upload(path, bytes).await?;
    blobs.download_url(&handle).await
}

/// Publishes a video as the current user, uploading its file first if any
pub async fn publish_video<D: Db + BlobStore>(
    db: &mut D,
    draft: VideoDraft,
) -> Result<ContentItem, Error> {
    let mut item = new_item(db, ContentKind::Video, &draft.title, &draft.description)?;
    item.transcript = draft
        .transcript
        .clone()
        .filter(|t| !t.trim().is_empty());
    item.url = match draft.source() {
        None => {
            return Err(Error::MissingMedia(String::from(
                "provide a video link or upload a file",
            )))
        }
        Some(VideoSource::Link(link)) => link,
        Some(VideoSource::Upload(bytes)) => {
            upload(db, &video_blob_path(&item.id), bytes).await?
        }
    };
    db.create_item(item).await
}

pub async fn publish_ebook<D: Db + BlobStore>(
    db: &mut D,
    draft: EbookDraft,
) -> Result<ContentItem, Error> {
    let mut item = new_item(db, ContentKind::Ebook, &draft.title, &draft.description)?;
    let pdf = draft
        .pdf
        .ok_or_else(|| Error::MissingMedia(String::from("upload a PDF file")))?;
    let cover = draft
        .cover
        .ok_or_else(|| Error::MissingMedia(String::from("upload a cover image")))?;
    item.url = upload(db, &ebook_blob_path(&item.id), pdf).await?;
    item.image_url = Some(upload(db, &cover_blob_path(&item.id), cover).await?);
    db.create_item(item).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthToken, NewSession, NewUser, Role, UserId};
    use lectern_mock_server::MockServer;

    fn user(server: &mut MockServer, name: &str, role: Role) -> AuthToken {
        let email = format!("{}@example.org", name.to_lowercase());
        server
            .admin_create_user(NewUser::new(
                UserId(Uuid::new_v4()),
                String::from(name),
                email.clone(),
                role,
                String::from("hunter2"),
            ))
            .unwrap();
        server
            .auth(NewSession::new(email, String::from("hunter2"), String::from("test")))
            .unwrap()
    }

    fn video(link: Option<&str>, file: Option<&[u8]>) -> VideoDraft {
        VideoDraft {
            title: String::from("Lifetimes"),
            description: String::from("Where do they come from"),
            transcript: None,
            link: link.map(String::from),
            file: file.map(Vec::from),
        }
    }

    #[tokio::test]
    async fn videos_need_media() {
        let mut server = MockServer::new();
        let alice = user(&mut server, "Alice", Role::Lecturer);
        let res = publish_video(&mut server.session(alice), video(Some("  "), None)).await;
        assert!(matches!(res, Err(Error::MissingMedia(_))));
    }

    #[tokio::test]
    async fn linked_and_uploaded_videos() {
        let mut server = MockServer::new();
        let alice = user(&mut server, "Alice", Role::Lecturer);

        let linked = publish_video(
            &mut server.session(alice),
            video(Some("https://youtu.be/dQw4w9WgXcQ"), None),
        )
        .await
        .unwrap();
        assert_eq!(linked.url, "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(linked.likes, 0);
        assert!(linked.comments.is_empty());

        let uploaded = publish_video(
            &mut server.session(alice),
            video(Some("https://youtu.be/dQw4w9WgXcQ"), Some(b"mp4 bytes")),
        )
        .await
        .unwrap();
        let handle = api::BlobHandle(video_blob_path(&uploaded.id));
        assert_eq!(server.fetch_blob(&handle).unwrap(), b"mp4 bytes".to_vec());
        assert_ne!(uploaded.url, linked.url);
    }

    #[tokio::test]
    async fn ebooks_need_pdf_and_cover() {
        let mut server = MockServer::new();
        let alice = user(&mut server, "Alice", Role::Lecturer);
        let draft = EbookDraft {
            title: String::from("The Book"),
            description: String::from("Read it"),
            pdf: Some(b"%PDF".to_vec()),
            cover: None,
        };
        assert_eq!(
            publish_ebook(&mut server.session(alice), draft.clone()).await,
            Err(Error::MissingMedia(String::from("upload a cover image")))
        );

        let book = publish_ebook(
            &mut server.session(alice),
            EbookDraft {
                cover: Some(b"png".to_vec()),
                ..draft
            },
        )
        .await
        .unwrap();
        assert!(book.image_url.is_some());
        let cover = api::BlobHandle(cover_blob_path(&book.id));
        assert_eq!(server.fetch_blob(&cover).unwrap(), b"png".to_vec());
    }

    #[tokio::test]
    async fn students_cannot_publish() {
        let mut server = MockServer::new();
        let bob = user(&mut server, "Bob", Role::Student);
        assert_eq!(
            publish_video(
                &mut server.session(bob),
                video(Some("https://youtu.be/dQw4w9WgXcQ"), None),
            )
            .await,
            Err(Error::PermissionDenied)
        );
    }
}
