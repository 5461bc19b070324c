//! Shared test utilities: in-memory database and fake collaborators

#![allow(dead_code)]

pub mod fakes;

use image::{ImageFormat, Rgb, RgbImage};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::io::Cursor;

/// In-memory database with the classification schema
///
/// Single connection: every `:memory:` connection is its own database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    cqm_classifier::db::init_tables(&pool).await.unwrap();
    pool
}

/// PNG bytes of a plain test photograph
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 190, 170]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// PNG bytes of dark round beans of `radius` on a light tray, one per center
pub fn beans_png(width: u32, height: u32, radius: i64, centers: &[(i64, i64)]) -> Vec<u8> {
    let mut image = RgbImage::from_pixel(width, height, Rgb([230, 225, 215]));
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (x, y) = (x as i64, y as i64);
        if centers
            .iter()
            .any(|(cx, cy)| (x - cx).pow(2) + (y - cy).pow(2) <= radius * radius)
        {
            *pixel = Rgb([90, 60, 40]);
        }
    }
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
