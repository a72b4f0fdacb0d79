pub mod services;

pub use services::{delete_image, image_url, parse_data_uri, store_image, ImageUpload};
