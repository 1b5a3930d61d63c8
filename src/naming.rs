//! File names for downloads, archive entries and tile ids.
//!
//! Every exported image is PNG-encoded, so derived names always end in
//! `.png` whatever the source extension was:
//! - `beach.jpg` cropped → `crop_beach.png`
//! - `beach.jpg` enhanced → `4k-beach.png`
//! - `beach.jpg` without background → `no_bg_beach.png`
//! - the third image of a bundle → `split_image_3.png`

use std::collections::HashSet;

/// File name of a zipped bundle.
pub const ZIP_ARCHIVE_NAME: &str = "all_images.zip";

/// Id of the tile at row-major `index` of a split.
pub fn tile_id(index: usize) -> String {
    format!("tile-{index}")
}

/// Archive entry name for the `n`th image of a bundle (1-based).
pub fn split_archive_name(n: usize) -> String {
    format!("split_image_{n}.png")
}

pub fn crop_download_name(name: &str) -> String {
    format!("crop_{}.png", file_stem(name))
}

pub fn enhanced_download_name(name: &str) -> String {
    format!("4k-{}.png", file_stem(name))
}

pub fn no_background_name(name: &str) -> String {
    format!("no_bg_{}.png", file_stem(name))
}

/// Name without its last extension. Dotfiles and extensionless names are
/// returned whole; an empty stem falls back to `image`.
pub fn file_stem(name: &str) -> &str {
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };
    if stem.is_empty() { "image" } else { stem }
}

/// Make every name unique by suffixing repeats: `a.png`, `a-2.png`, `a-3.png`.
///
/// Order is preserved and first occurrences keep their name.
pub fn unique_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            if taken.insert(name.to_string()) {
                return name.to_string();
            }
            let (stem, ext) = match name.rfind('.') {
                Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
                _ => (name, ""),
            };
            let mut n = 2;
            loop {
                let candidate = format!("{stem}-{n}{ext}");
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_ids_are_zero_based() {
        assert_eq!(tile_id(0), "tile-0");
        assert_eq!(tile_id(11), "tile-11");
    }

    #[test]
    fn archive_names_are_one_based() {
        assert_eq!(split_archive_name(1), "split_image_1.png");
    }

    #[test]
    fn download_names_swap_extension_for_png() {
        assert_eq!(crop_download_name("beach.jpg"), "crop_beach.png");
        assert_eq!(enhanced_download_name("beach.jpg"), "4k-beach.png");
        assert_eq!(no_background_name("beach.jpg"), "no_bg_beach.png");
    }

    #[test]
    fn only_last_extension_is_dropped() {
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
    }

    #[test]
    fn extensionless_and_dotfiles_kept_whole() {
        assert_eq!(file_stem("tile-3"), "tile-3");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn empty_stem_falls_back() {
        assert_eq!(file_stem(""), "image");
        assert_eq!(crop_download_name(""), "crop_image.png");
    }

    #[test]
    fn unique_names_suffixes_repeats() {
        let names = ["a.png", "b.png", "a.png", "a.png", "a-2.png"];
        assert_eq!(
            unique_names(&names),
            vec!["a.png", "b.png", "a-2.png", "a-3.png", "a-2-2.png"]
        );
    }

    #[test]
    fn unique_names_without_extension() {
        assert_eq!(unique_names(&["x", "x"]), vec!["x", "x-2"]);
    }
}
