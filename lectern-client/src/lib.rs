mod engagement;
pub use engagement::EngagementStore;

mod list;
pub use list::{ContentList, ItemView, Overview, Scope, COMMENTS_PER_PAGE};

mod publish;
pub use publish::{
    cover_blob_path, ebook_blob_path, publish_ebook, publish_video, video_blob_path, EbookDraft,
    VideoDraft, VideoSource,
};

pub mod api {
    pub use lectern_api::*;
}
