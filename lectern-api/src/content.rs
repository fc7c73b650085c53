use std::{borrow::Cow, collections::HashSet};

use uuid::Uuid;

use crate::{Comment, Error, Event, EventData, Reply, Time, UserId};

/// Number of characters shown of a collapsed description or transcript
pub const PREVIEW_LEN: usize = 250;

// Prefixes after which a YouTube url carries the 11-character video id
const YOUTUBE_MARKERS: &[&str] = &[
    "youtu.be/",
    "v/",
    "u/w/",
    "embed/",
    "watch?v=",
    "&v=",
    "/videos/",
    "/video/",
    "/shorts/",
    "/playlist/",
    "/playlist?list=",
];
const YOUTUBE_ID_LEN: usize = 11;
const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ItemId(pub Uuid);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Ebook,
}

impl ContentKind {
    /// Name of the collection holding items of this kind
    pub fn collection(&self) -> &'static str {
        match self {
            ContentKind::Video => "videos",
            ContentKind::Ebook => "ebooks",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Ebook => "ebook",
        }
    }

    pub fn parse(s: &str) -> Option<ContentKind> {
        match s {
            "video" => Some(ContentKind::Video),
            "ebook" => Some(ContentKind::Ebook),
            _ => None,
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<ContentKind, Error> {
        ContentKind::parse(s).ok_or_else(|| Error::InvalidName(String::from(s)))
    }
}

/// Creation record of an item, before anyone engaged with it
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewItem {
    pub id: ItemId,
    pub kind: ContentKind,
    pub owner_id: UserId,
    pub owner_name: String,
    pub date: Time,

    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
    pub transcript: Option<String>,
}

impl NewItem {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.owner_name)?;
        crate::validate_text(&self.title)?;
        crate::validate_text(&self.description)?;
        crate::validate_string(&self.url)?;
        if self.url.trim().is_empty() {
            return Err(Error::MissingMedia(String::from("an item needs a media url")));
        }
        if let Some(image_url) = &self.image_url {
            crate::validate_string(image_url)?;
        }
        if let Some(transcript) = &self.transcript {
            crate::validate_string(transcript)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub kind: ContentKind,
    pub owner_id: UserId,
    pub owner_name: String,
    pub date: Time,

    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
    pub transcript: Option<String>,

    /// Always the length of `liked_by`
    pub likes: u64,

    /// Users who liked this item, in the order they first did
    pub liked_by: Vec<UserId>,

    /// Comments in chronological order
    pub comments: Vec<Comment>,
}

impl From<NewItem> for ContentItem {
    fn from(i: NewItem) -> ContentItem {
        ContentItem {
            id: i.id,
            kind: i.kind,
            owner_id: i.owner_id,
            owner_name: i.owner_name,
            date: i.date,
            title: i.title,
            description: i.description,
            url: i.url,
            image_url: i.image_url,
            transcript: i.transcript,
            likes: 0,
            liked_by: Vec::new(),
            comments: Vec::new(),
        }
    }
}

impl ContentItem {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner_id == *user
    }

    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liked_by.contains(user)
    }

    pub fn comment(&self, id: &crate::CommentId) -> Option<&Comment> {
        Comment::find_in(&self.comments, id)
    }

    /// Restores the like invariants on a record read from storage, returning
    /// whether anything had to be fixed
    pub fn normalize(&mut self) -> bool {
        let mut seen = HashSet::with_capacity(self.liked_by.len());
        let len_before = self.liked_by.len();
        self.liked_by.retain(|u| seen.insert(*u));
        let likes = self.liked_by.len() as u64;
        let changed = len_before != self.liked_by.len() || self.likes != likes;
        self.likes = likes;
        changed
    }

    /// Validates, authorizes and applies `e`. On error, `self` is left untouched.
    pub fn submit(&mut self, e: &Event) -> Result<(), Error> {
        e.validate()?;
        e.authorize(self)?;
        self.apply(e)
    }

    /// Applies an event that was already validated and authorized
    pub fn apply(&mut self, e: &Event) -> Result<(), Error> {
        if e.item_id != self.id || e.kind != self.kind {
            return Err(Error::ItemNotFound(e.item_id));
        }
        match &e.data {
            EventData::Like => {
                if !self.is_liked_by(&e.owner_id) {
                    self.liked_by.push(e.owner_id);
                }
            }
            EventData::AddComment {
                id,
                author_name,
                text,
            } => {
                if self.comments.iter().any(|c| c.uses_id(id)) {
                    return Err(Error::UuidAlreadyUsed(id.0));
                }
                self.comments.push(Comment {
                    id: *id,
                    author_id: e.owner_id,
                    author_name: author_name.clone(),
                    text: text.clone(),
                    date: e.date,
                    replies: Vec::new(),
                });
            }
            EventData::AddReply {
                comment_id,
                id,
                author_name,
                text,
            } => {
                if self.comments.iter().any(|c| c.uses_id(id)) {
                    return Err(Error::UuidAlreadyUsed(id.0));
                }
                let parent = Comment::find_in_mut(&mut self.comments, comment_id)
                    .ok_or(Error::CommentNotFound(*comment_id))?;
                parent.replies.push(Reply {
                    id: *id,
                    author_id: e.owner_id,
                    author_name: author_name.clone(),
                    text: text.clone(),
                    date: e.date,
                });
            }
            EventData::DeleteComment(id) => {
                let pos = self
                    .comments
                    .iter()
                    .position(|c| c.id == *id)
                    .ok_or(Error::CommentNotFound(*id))?;
                self.comments.remove(pos);
            }
            EventData::Edit { title, description } => {
                self.title = title.clone();
                self.description = description.clone();
            }
        }
        self.likes = self.liked_by.len() as u64;
        Ok(())
    }

    /// YouTube embed link for videos hosted there
    pub fn embed_url(&self) -> Option<String> {
        match self.kind {
            ContentKind::Video => youtube_id(&self.url)
                .map(|id| format!("https://www.youtube.com/embed/{}", id)),
            ContentKind::Ebook => None,
        }
    }

    /// Whether `query` appears in the title or description, ignoring case
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }
}

fn is_youtube_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Extracts the video id out of the usual YouTube url shapes. When several
/// markers match, the rightmost one wins.
pub fn youtube_id(url: &str) -> Option<&str> {
    if !YOUTUBE_HOSTS.iter().any(|h| url.contains(h)) {
        return None;
    }
    let mut best: Option<(usize, &str)> = None;
    for marker in YOUTUBE_MARKERS {
        for (pos, _) in url.match_indices(marker) {
            let rest = &url[pos + marker.len()..];
            let id_len = rest
                .chars()
                .take_while(|c| is_youtube_id_char(*c))
                .take(YOUTUBE_ID_LEN)
                .count();
            if id_len == YOUTUBE_ID_LEN && best.map_or(true, |(p, _)| pos > p) {
                best = Some((pos, &rest[..YOUTUBE_ID_LEN]));
            }
        }
    }
    best.map(|(_, id)| id)
}

/// Collapsed rendering of a long text
pub fn preview(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!("{}...", &text[..cut])),
    }
}
