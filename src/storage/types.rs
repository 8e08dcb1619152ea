//! Types for image uploads

use std::fmt;
use std::path::Path;

use uuid::Uuid;

/// Bucket holding listing photos; objects are publicly readable
pub const PRODUCT_IMAGES_BUCKET: &str = "product-images";

/// Upper bound for a single image, 5 MiB
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// A file picked for upload
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Original file name, used for the extension
    pub name: String,

    /// Declared media type, e.g. `image/jpeg`
    pub media_type: String,

    /// File contents
    pub data: Vec<u8>,
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.data.len())
            .finish()
    }
}

impl ImageFile {
    pub fn new(name: &str, media_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            media_type: media_type.to_string(),
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// Extension of the original name, without the dot
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
    }

    /// `{owner}/{random}.{ext}`; files without an extension get none
    pub fn storage_path(&self, owner_id: &Uuid) -> String {
        let random = Uuid::new_v4().simple();
        match self.extension() {
            Some(ext) => format!("{}/{}.{}", owner_id, random, ext),
            None => format!("{}/{}", owner_id, random),
        }
    }
}
