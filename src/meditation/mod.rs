//! Meditation domain: row types, the repository over the backends, the daily
//! rotation rule and the list filter/sort used by the admin views.

mod model;
pub mod filter;
pub mod repo;
pub mod rotation;

pub use model::{
    ALLOWED_MIME, Meditation, MeditationChanges, MeditationView, NewMeditation,
    is_allowed_mime, non_blank, normalize_tags, parse_tags,
};
pub use filter::{ListQuery, Listable, SortOrder, tag_universe};
pub use repo::{
    AudioUpload, MeditationPatch, MeditationRepository, ScheduleEntry, TagsInput, UploadRequest, ValidatedUpload,
};
pub use rotation::{ScheduledDay, day_index, schedule, select_for_day};
