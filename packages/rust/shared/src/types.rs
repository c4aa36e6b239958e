//! Core domain types: source pages, content blocks, and their media payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::PropertyNames;
use crate::error::{Result, SyncError};

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// One styled run of inline text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RichText {
    /// `text`, `mention` or `equation`.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Text with mentions and equations already flattened.
    #[serde(default)]
    pub plain_text: String,
    /// Link target, if the run is a link.
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub text: Option<TextContent>,
}

impl RichText {
    /// An unstyled run of text.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind: "text".into(),
            plain_text: text.clone(),
            href: None,
            annotations: Annotations::default(),
            text: Some(TextContent { content: text }),
        }
    }

    /// The visible text of this run.
    pub fn content(&self) -> &str {
        if !self.plain_text.is_empty() {
            return &self.plain_text;
        }
        self.text.as_ref().map(|t| t.content.as_str()).unwrap_or("")
    }
}

/// Raw text payload of a `text` run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

/// Inline styling flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
}

/// Concatenate the visible text of a rich-text sequence.
pub fn plain_text(runs: &[RichText]) -> String {
    runs.iter().map(RichText::content).collect()
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// Where a media binary lives. Exactly one location is populated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    /// Hosted outside the source database.
    External { external: FileUrl },
    /// Hosted by the source database behind an expiring URL.
    File { file: FileUrl },
}

/// URL payload of a media location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileUrl {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expiry_time: Option<String>,
}

impl MediaSource {
    pub fn external(url: impl Into<String>) -> Self {
        Self::External {
            external: FileUrl {
                url: url.into(),
                expiry_time: None,
            },
        }
    }

    pub fn hosted(url: impl Into<String>) -> Self {
        Self::File {
            file: FileUrl {
                url: url.into(),
                expiry_time: None,
            },
        }
    }

    /// The URL of whichever location is populated.
    pub fn url(&self) -> &str {
        match self {
            Self::External { external } => &external.url,
            Self::File { file } => &file.url,
        }
    }

    /// Replace the URL in place, keeping the location variant.
    pub fn set_url(&mut self, url: impl Into<String>) {
        match self {
            Self::External { external } => external.url = url.into(),
            Self::File { file } => {
                file.url = url.into();
                file.expiry_time = None;
            }
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }
}

/// Page or callout icon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Icon {
    Emoji {
        emoji: String,
    },
    External {
        external: FileUrl,
    },
    File {
        file: FileUrl,
    },
    #[serde(other)]
    Other,
}

impl Icon {
    /// The emoji character, or `""` for image icons.
    pub fn emoji(&self) -> &str {
        match self {
            Self::Emoji { emoji } => emoji,
            _ => "",
        }
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// One content unit of a page, with its resolved children.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawBlock")]
pub struct Block {
    pub id: String,
    /// Whether the source reports nested content under this block.
    pub has_children: bool,
    pub kind: BlockKind,
    /// Nested blocks, filled in by the block-tree fetch.
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            has_children: false,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.has_children = !children.is_empty();
        self.children = children;
        self
    }

    /// The source `type` discriminant.
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}

/// Typed payload of a block, keyed by the source `type` discriminant.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Paragraph(TextBlock),
    Heading1(TextBlock),
    Heading2(TextBlock),
    Heading3(TextBlock),
    BulletedListItem(TextBlock),
    NumberedListItem(TextBlock),
    ToDo(ToDoBlock),
    Toggle(TextBlock),
    Quote(TextBlock),
    Callout(CalloutBlock),
    Code(CodeBlock),
    Divider,
    Equation(EquationBlock),
    Image(MediaBlock),
    Video(MediaBlock),
    File(MediaBlock),
    Pdf(MediaBlock),
    Embed(LinkBlock),
    Bookmark(LinkBlock),
    LinkPreview(LinkBlock),
    ChildPage(ChildPageBlock),
    Table(TableBlock),
    TableRow(TableRowBlock),
    /// Any type this crate does not model, kept verbatim.
    Other { block_type: String, payload: Value },
}

impl BlockKind {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Paragraph(_) => "paragraph",
            Self::Heading1(_) => "heading_1",
            Self::Heading2(_) => "heading_2",
            Self::Heading3(_) => "heading_3",
            Self::BulletedListItem(_) => "bulleted_list_item",
            Self::NumberedListItem(_) => "numbered_list_item",
            Self::ToDo(_) => "to_do",
            Self::Toggle(_) => "toggle",
            Self::Quote(_) => "quote",
            Self::Callout(_) => "callout",
            Self::Code(_) => "code",
            Self::Divider => "divider",
            Self::Equation(_) => "equation",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::File(_) => "file",
            Self::Pdf(_) => "pdf",
            Self::Embed(_) => "embed",
            Self::Bookmark(_) => "bookmark",
            Self::LinkPreview(_) => "link_preview",
            Self::ChildPage(_) => "child_page",
            Self::Table(_) => "table",
            Self::TableRow(_) => "table_row",
            Self::Other { block_type, .. } => block_type,
        }
    }

    /// Decode the payload stored under the block's `type` key.
    ///
    /// A payload that does not match the expected shape degrades to
    /// [`BlockKind::Other`] so one odd block never fails a whole page.
    fn decode(block_type: &str, payload: Value) -> Self {
        fn typed<T: serde::de::DeserializeOwned>(
            payload: &Value,
            wrap: fn(T) -> BlockKind,
        ) -> std::result::Result<BlockKind, serde_json::Error> {
            T::deserialize(payload).map(wrap)
        }

        let decoded = match block_type {
            "paragraph" => typed(&payload, Self::Paragraph),
            "heading_1" => typed(&payload, Self::Heading1),
            "heading_2" => typed(&payload, Self::Heading2),
            "heading_3" => typed(&payload, Self::Heading3),
            "bulleted_list_item" => typed(&payload, Self::BulletedListItem),
            "numbered_list_item" => typed(&payload, Self::NumberedListItem),
            "to_do" => typed(&payload, Self::ToDo),
            "toggle" => typed(&payload, Self::Toggle),
            "quote" => typed(&payload, Self::Quote),
            "callout" => typed(&payload, Self::Callout),
            "code" => typed(&payload, Self::Code),
            "divider" => Ok(Self::Divider),
            "equation" => typed(&payload, Self::Equation),
            "image" => typed(&payload, Self::Image),
            "video" => typed(&payload, Self::Video),
            "file" => typed(&payload, Self::File),
            "pdf" => typed(&payload, Self::Pdf),
            "embed" => typed(&payload, Self::Embed),
            "bookmark" => typed(&payload, Self::Bookmark),
            "link_preview" => typed(&payload, Self::LinkPreview),
            "child_page" => typed(&payload, Self::ChildPage),
            "table" => typed(&payload, Self::Table),
            "table_row" => typed(&payload, Self::TableRow),
            _ => {
                return Self::Other {
                    block_type: block_type.to_string(),
                    payload,
                };
            }
        };

        decoded.unwrap_or_else(|e| {
            tracing::warn!(block_type, error = %e, "unexpected block payload, keeping it untyped");
            Self::Other {
                block_type: block_type.to_string(),
                payload,
            }
        })
    }
}

/// Wire shape of a block: the payload sits under a key named by `type`.
#[derive(Deserialize)]
struct RawBlock {
    id: String,
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    has_children: bool,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl From<RawBlock> for Block {
    fn from(mut raw: RawBlock) -> Self {
        let payload = raw.rest.remove(&raw.block_type).unwrap_or(Value::Null);
        Self {
            id: raw.id,
            has_children: raw.has_children,
            kind: BlockKind::decode(&raw.block_type, payload),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
}

impl TextBlock {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            rich_text: vec![RichText::plain(text)],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToDoBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CalloutBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub icon: Option<Icon>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub caption: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EquationBlock {
    #[serde(default)]
    pub expression: String,
}

/// Image, video, file and pdf payloads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaBlock {
    #[serde(flatten)]
    pub source: MediaSource,
    #[serde(default)]
    pub caption: Vec<RichText>,
    #[serde(default)]
    pub name: Option<String>,
}

impl MediaBlock {
    pub fn new(source: MediaSource) -> Self {
        Self {
            source,
            caption: Vec::new(),
            name: None,
        }
    }
}

/// Embed, bookmark and link-preview payloads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkBlock {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub caption: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChildPageBlock {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TableBlock {
    #[serde(default)]
    pub table_width: usize,
    #[serde(default)]
    pub has_column_header: bool,
    #[serde(default)]
    pub has_row_header: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableRowBlock {
    #[serde(default)]
    pub cells: Vec<Vec<RichText>>,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// A page record as returned by the database query.
#[derive(Debug, Clone, Deserialize)]
pub struct PageRecord {
    pub id: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub icon: Option<Value>,
    #[serde(default)]
    pub cover: Option<Value>,
}

/// The front-matter-relevant view of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Stable source identifier.
    pub id: String,
    pub title: String,
    /// Creation timestamp truncated to the UTC day.
    pub created_at: NaiveDate,
    /// Tag labels in source order.
    pub tags: Vec<String>,
    /// Emoji icon or empty.
    pub icon: String,
    /// Cover image URL or empty.
    pub cover_url: String,
}

impl Page {
    /// Extract the page view from a raw record using the configured property names.
    pub fn from_record(record: &PageRecord, props: &PropertyNames) -> Result<Self> {
        let title = record
            .properties
            .get(&props.title)
            .and_then(|p| p.get("title"))
            .and_then(Value::as_array)
            .and_then(|runs| runs.first())
            .and_then(|run| {
                run.get("plain_text")
                    .and_then(Value::as_str)
                    .or_else(|| run.pointer("/text/content").and_then(Value::as_str))
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SyncError::missing_property(&record.id, &props.title))?
            .to_string();

        let tags = record
            .properties
            .get(&props.tags)
            .and_then(|p| p.get("multi_select"))
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(|o| o.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let created = record
            .properties
            .get(&props.created)
            .and_then(|p| p.get("created_time"))
            .and_then(Value::as_str)
            .or(record.created_time.as_deref())
            .ok_or_else(|| SyncError::missing_property(&record.id, &props.created))?;
        let created_at = DateTime::parse_from_rfc3339(created)
            .map_err(|e| {
                SyncError::validation(format!(
                    "page {}: invalid creation timestamp '{created}': {e}",
                    record.id
                ))
            })?
            .with_timezone(&Utc)
            .date_naive();

        let icon = record
            .icon
            .as_ref()
            .and_then(|v| Icon::deserialize(v).ok())
            .map(|i| i.emoji().to_string())
            .unwrap_or_default();

        let cover_url = record
            .cover
            .as_ref()
            .and_then(|v| MediaSource::deserialize(v).ok())
            .map(|c| c.url().to_string())
            .unwrap_or_default();

        Ok(Self {
            id: record.id.clone(),
            title,
            created_at,
            tags,
            icon,
            cover_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> PageRecord {
        serde_json::from_value(value).expect("page record")
    }

    fn trip_record() -> Value {
        json!({
            "object": "page",
            "id": "0b6a4c2e-1f6d-4d6a-9a59-9b3c4c1c1e11",
            "created_time": "2024-03-01T23:30:00.000Z",
            "icon": { "type": "emoji", "emoji": "🌍" },
            "cover": { "type": "external", "external": { "url": "https://x/img.png" } },
            "properties": {
                "Name": {
                    "id": "title",
                    "type": "title",
                    "title": [
                        { "type": "text", "text": { "content": "My Trip", "link": null }, "plain_text": "My Trip" },
                        { "type": "text", "text": { "content": " (draft)", "link": null }, "plain_text": " (draft)" }
                    ]
                },
                "Tags": {
                    "type": "multi_select",
                    "multi_select": [
                        { "id": "a", "name": "Travel", "color": "blue" },
                        { "id": "b", "name": "Food", "color": "red" }
                    ]
                },
                "Created": { "type": "created_time", "created_time": "2024-03-01T10:00:00.000Z" }
            }
        })
    }

    #[test]
    fn page_from_record_extracts_front_matter_fields() {
        let page = Page::from_record(&record(trip_record()), &PropertyNames::default()).unwrap();
        assert_eq!(page.title, "My Trip");
        assert_eq!(page.created_at.to_string(), "2024-03-01");
        assert_eq!(page.tags, vec!["Travel".to_string(), "Food".to_string()]);
        assert_eq!(page.icon, "🌍");
        assert_eq!(page.cover_url, "https://x/img.png");
    }

    #[test]
    fn page_without_title_reports_page_id() {
        let mut value = trip_record();
        value["properties"]["Name"]["title"] = json!([]);
        let err = Page::from_record(&record(value), &PropertyNames::default()).unwrap_err();
        assert!(matches!(err, SyncError::MissingProperty { .. }));
        assert!(err.to_string().contains("0b6a4c2e-1f6d-4d6a-9a59-9b3c4c1c1e11"));
        assert!(err.to_string().contains("'Name'"));
    }

    #[test]
    fn page_optional_fields_default_to_empty() {
        let mut value = trip_record();
        value["icon"] = Value::Null;
        value["cover"] = Value::Null;
        value["properties"].as_object_mut().unwrap().remove("Tags");
        let page = Page::from_record(&record(value), &PropertyNames::default()).unwrap();
        assert_eq!(page.icon, "");
        assert_eq!(page.cover_url, "");
        assert!(page.tags.is_empty());
    }

    #[test]
    fn page_falls_back_to_record_created_time() {
        let mut value = trip_record();
        value["properties"].as_object_mut().unwrap().remove("Created");
        let page = Page::from_record(&record(value), &PropertyNames::default()).unwrap();
        // 23:30 UTC stays on the same UTC day
        assert_eq!(page.created_at.to_string(), "2024-03-01");
    }

    #[test]
    fn image_icon_and_hosted_cover() {
        let mut value = trip_record();
        value["icon"] = json!({ "type": "external", "external": { "url": "https://x/icon.png" } });
        value["cover"] = json!({
            "type": "file",
            "file": { "url": "https://s3.example/cover.png?sig=1", "expiry_time": "2024-03-01T11:00:00.000Z" }
        });
        let page = Page::from_record(&record(value), &PropertyNames::default()).unwrap();
        assert_eq!(page.icon, "");
        assert_eq!(page.cover_url, "https://s3.example/cover.png?sig=1");
    }

    #[test]
    fn image_block_decodes_both_media_locations() {
        let external: Block = serde_json::from_value(json!({
            "object": "block",
            "id": "img-1",
            "type": "image",
            "has_children": false,
            "image": {
                "type": "external",
                "external": { "url": "https://x/photo.png" },
                "caption": [{ "type": "text", "plain_text": "Sunset" }]
            }
        }))
        .unwrap();
        let BlockKind::Image(media) = &external.kind else {
            panic!("expected image, got {:?}", external.kind);
        };
        assert!(media.source.is_external());
        assert_eq!(media.source.url(), "https://x/photo.png");
        assert_eq!(plain_text(&media.caption), "Sunset");

        let hosted: Block = serde_json::from_value(json!({
            "id": "img-2",
            "type": "image",
            "image": { "type": "file", "file": { "url": "https://s3/photo.png", "expiry_time": "2024-01-01T00:00:00.000Z" } }
        }))
        .unwrap();
        let BlockKind::Image(media) = &hosted.kind else {
            panic!("expected image");
        };
        assert!(!media.source.is_external());
        assert_eq!(media.source.url(), "https://s3/photo.png");
    }

    #[test]
    fn set_url_keeps_location_variant() {
        let mut hosted = MediaSource::hosted("https://s3/photo.png");
        hosted.set_url("assets/a.jpg");
        assert_eq!(hosted, MediaSource::hosted("assets/a.jpg"));

        let mut external = MediaSource::external("https://x/photo.png");
        external.set_url("assets/b.jpg");
        assert!(external.is_external());
        assert_eq!(external.url(), "assets/b.jpg");
    }

    #[test]
    fn unknown_block_type_is_kept_verbatim() {
        let block: Block = serde_json::from_value(json!({
            "id": "col-1",
            "type": "column_list",
            "has_children": true,
            "column_list": {}
        }))
        .unwrap();
        assert_eq!(block.type_name(), "column_list");
        assert!(block.has_children);
        assert!(matches!(block.kind, BlockKind::Other { .. }));
    }

    #[test]
    fn malformed_payload_degrades_to_other() {
        let block: Block = serde_json::from_value(json!({
            "id": "img-3",
            "type": "image",
            "image": { "type": "file_upload", "file_upload": { "id": "u1" } }
        }))
        .unwrap();
        assert_eq!(block.type_name(), "image");
        assert!(matches!(block.kind, BlockKind::Other { .. }));
    }
}
