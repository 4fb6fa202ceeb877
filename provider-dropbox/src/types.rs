//! Dropbox API request and response types
//!
//! Only the fields the sync engine depends on are modelled; unknown fields
//! are ignored during deserialization.

use bridge_traits::storage::EntryTag;
use serde::{Deserialize, Serialize};

fn file_tag() -> EntryTag {
    EntryTag::File
}

/// Metadata for a file, folder or deleted entry.
///
/// See: https://www.dropbox.com/developers/documentation/http/documentation#files-get_metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropboxEntry {
    /// Absent on upload responses, which always describe a file
    #[serde(rename = ".tag", default = "file_tag")]
    pub tag: EntryTag,

    pub name: String,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub path_lower: Option<String>,

    #[serde(default)]
    pub path_display: Option<String>,

    #[serde(default)]
    pub rev: Option<String>,

    /// ISO 8601 timestamp, e.g. `2015-05-12T15:50:38Z`
    #[serde(default)]
    pub server_modified: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,

    /// Present only for entries inside shared folders
    #[serde(default)]
    pub sharing_info: Option<SharingInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingInfo {
    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub parent_shared_folder_id: Option<String>,

    /// Account id of the last user to modify the file
    #[serde(default)]
    pub modified_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListFolderArg<'a> {
    pub path: &'a str,
    pub recursive: bool,
    pub include_deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ListFolderContinueArg<'a> {
    pub cursor: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ListFolderResponse {
    pub entries: Vec<DropboxEntry>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct PathArg<'a> {
    pub path: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Add,
    Overwrite,
}

#[derive(Debug, Serialize)]
pub struct UploadArg<'a> {
    pub path: &'a str,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
}

#[derive(Debug, Serialize)]
pub struct GetAccountBatchArg<'a> {
    pub account_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct BasicAccount {
    pub account_id: String,
    pub name: AccountName,
}

#[derive(Debug, Deserialize)]
pub struct AccountName {
    pub display_name: String,
}

/// Body returned with status 409
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error_summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_entry_with_sharing_info() {
        let json = r#"{
            ".tag": "file",
            "name": "Road Trip.mix",
            "id": "id:a4ayc_80_OEAAAAAAAAAXw",
            "path_lower": "/playlists/road trip.mix",
            "path_display": "/Playlists/Road Trip.mix",
            "rev": "a1c10ce0dd78",
            "server_modified": "2015-05-12T15:50:38Z",
            "size": 7212,
            "sharing_info": {
                "read_only": false,
                "parent_shared_folder_id": "84528192421",
                "modified_by": "dbid:AAH4f99T0taONIb-OurWxbNQ6ywGRopQngc"
            },
            "content_hash": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        }"#;

        let entry: DropboxEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.tag, EntryTag::File);
        assert_eq!(entry.size, Some(7212));
        assert_eq!(
            entry.sharing_info.and_then(|s| s.modified_by).as_deref(),
            Some("dbid:AAH4f99T0taONIb-OurWxbNQ6ywGRopQngc")
        );
    }

    #[test]
    fn test_folder_entry_has_no_rev() {
        let json = r#"{".tag": "folder", "name": "Playlists", "path_lower": "/playlists"}"#;
        let entry: DropboxEntry = serde_json::from_str(json).unwrap();

        assert_eq!(entry.tag, EntryTag::Folder);
        assert!(entry.rev.is_none());
        assert!(entry.sharing_info.is_none());
    }

    #[test]
    fn test_untagged_upload_response_is_file() {
        let json = r#"{"name": "a.mix", "rev": "015f", "path_lower": "/a.mix"}"#;
        let entry: DropboxEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.tag, EntryTag::File);
    }

    #[test]
    fn test_upload_arg_shape() {
        let arg = UploadArg {
            path: "/a.mix",
            mode: WriteMode::Overwrite,
            autorename: false,
            mute: true,
        };
        assert_eq!(
            serde_json::to_string(&arg).unwrap(),
            r#"{"path":"/a.mix","mode":"overwrite","autorename":false,"mute":true}"#
        );
    }
}
