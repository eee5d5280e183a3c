use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use gdk_pixbuf::{glib, Colorspace, Pixbuf};

use crate::Status;

/// Icon name used whenever nothing better can be determined.
pub const FALLBACK_ICON_NAME: &str = "image-missing";

#[derive(thiserror::Error, Debug)]
pub enum IconError {
    #[error("no valid pixmaps found")]
    NoValidPixmap,
    #[error("pixmap of {width}x{height} does not fit in memory")]
    PixmapTooLarge { width: i32, height: i32 },
    #[error("writing icon to {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: glib::Error,
    },
}

/// What an item's icon resolved to, in the form handed to the visual host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconRepresentation {
    /// An icon name to be looked up in the icon theme.
    ThemeName(String),
    /// An image file on disk.
    FilePath(PathBuf),
    /// Nothing usable, displayed as [`FALLBACK_ICON_NAME`].
    Missing,
}

impl IconRepresentation {
    /// The token a visual host displays: theme name, file path or the fallback icon name.
    pub fn token(&self) -> Cow<'_, str> {
        match self {
            IconRepresentation::ThemeName(name) => Cow::Borrowed(name.as_str()),
            IconRepresentation::FilePath(path) => path.to_string_lossy(),
            IconRepresentation::Missing => Cow::Borrowed(FALLBACK_ICON_NAME),
        }
    }
}

/// One entry of an `IconPixmap`-style property: ARGB32 pixels in network byte order.
///
/// See the StatusNotifierItem [Icon format].
///
/// [Icon format]: https://freedesktop.org/wiki/Specifications/StatusNotifierItem/Icons/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    pub width: i32,
    pub height: i32,
    pub data: Vec<u8>,
}

impl From<(i32, i32, Vec<u8>)> for Pixmap {
    fn from((width, height, data): (i32, i32, Vec<u8>)) -> Self {
        Pixmap { width, height, data }
    }
}

impl Pixmap {
    /// Number of pixels, if the dimensions are positive.
    fn area(&self) -> Option<usize> {
        let width = usize::try_from(self.width).ok().filter(|w| *w > 0)?;
        let height = usize::try_from(self.height).ok().filter(|h| *h > 0)?;
        width.checked_mul(height)
    }

    /// The buffer holds exactly `width * height` four byte pixels.
    fn is_well_formed(&self) -> bool {
        self.area().and_then(|area| area.checked_mul(4)) == Some(self.data.len())
    }
}

/// Icon related properties of an item, as fetched from the bus. Empty strings are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconProperties {
    pub theme_path: Option<String>,
    pub icon_name: Option<String>,
    pub attention_icon_name: Option<String>,
    pub overlay_icon_name: Option<String>,
    pub icon_pixmap: Option<Vec<Pixmap>>,
    pub attention_icon_pixmap: Option<Vec<Pixmap>>,
}

impl IconProperties {
    /// Whether any of the name properties is set. Names take precedence over pixmaps.
    pub fn has_names(&self) -> bool {
        self.icon_name.is_some() || self.attention_icon_name.is_some() || self.overlay_icon_name.is_some()
    }

    /// The icon name to show for `status`, if there is one.
    ///
    /// The overlay name only counts towards [`IconProperties::has_names`], it is never shown.
    pub fn name_for(&self, status: Status) -> Option<&str> {
        match status {
            Status::Active => self.icon_name.as_deref(),
            Status::NeedsAttention => self.attention_icon_name.as_deref().or(self.icon_name.as_deref()),
            Status::Passive => None,
        }
    }

    /// The pixmaps to show for `status`, if there are any.
    pub fn pixmaps_for(&self, status: Status) -> Option<&[Pixmap]> {
        match status {
            Status::Active => self.icon_pixmap.as_deref(),
            Status::NeedsAttention => self.attention_icon_pixmap.as_deref().or(self.icon_pixmap.as_deref()),
            Status::Passive => None,
        }
    }
}

/// Resolve the icon an item should currently display.
///
/// Pixmaps are only looked at if the item has no icon names at all; the winning pixmap is
/// written to disk through `files`.
pub fn resolve_icon(status: Status, props: &IconProperties, files: &mut PixmapFiles) -> IconRepresentation {
    if props.has_names() {
        let name = props.name_for(status).unwrap_or(FALLBACK_ICON_NAME);
        return icon_from_name(name, props.theme_path.as_deref());
    }

    let Some(pixmaps) = props.pixmaps_for(status) else {
        log::warn!("No pixmaps to use");
        return IconRepresentation::Missing;
    };

    match icon_from_pixmaps(pixmaps, files) {
        Ok(path) => IconRepresentation::FilePath(path),
        Err(e) => {
            log::warn!("{}", e);
            IconRepresentation::Missing
        }
    }
}

/// Turn an icon name into something the host can display, resolving it against the item's
/// own theme directory if it ships one.
pub fn icon_from_name(icon_name: &str, theme_path: Option<&str>) -> IconRepresentation {
    if Path::new(icon_name).is_absolute() {
        return IconRepresentation::FilePath(PathBuf::from(icon_name));
    }
    let Some(theme_path) = theme_path else {
        return IconRepresentation::ThemeName(icon_name.to_owned());
    };

    let png = Path::new(theme_path).join(format!("{icon_name}.png"));
    if png.exists() {
        return IconRepresentation::FilePath(png);
    }
    let svg = Path::new(theme_path).join(format!("{icon_name}.svg"));
    if svg.exists() {
        return IconRepresentation::FilePath(svg);
    }

    log::warn!("No valid images found at theme path: {} (icon name: {})", theme_path, icon_name);
    IconRepresentation::FilePath(png)
}

/// Pick the largest well-formed pixmap.
///
/// Samples whose buffer length doesn't match their dimensions are skipped, however large they
/// claim to be. On equal areas the earlier sample wins.
pub fn select_pixmap(pixmaps: &[Pixmap]) -> Option<&Pixmap> {
    pixmaps.iter().filter(|p| p.is_well_formed()).fold(None, |best: Option<&Pixmap>, candidate| match best {
        Some(best) if best.area() >= candidate.area() => Some(best),
        _ => Some(candidate),
    })
}

/// Convert pixel data from ARGB32 (network byte order) to RGBA32, which is what gdk-pixbuf
/// understands.
pub fn argb_to_rgba(data: &mut [u8]) {
    for pixel in data.chunks_exact_mut(4) {
        pixel.rotate_left(1);
    }
}

fn icon_from_pixmaps(pixmaps: &[Pixmap], files: &mut PixmapFiles) -> std::result::Result<PathBuf, IconError> {
    let pixmap = select_pixmap(pixmaps).ok_or(IconError::NoValidPixmap)?;
    log::debug!("using {}x{} pixmap out of {} candidates", pixmap.width, pixmap.height, pixmaps.len());
    files.write(pixmap)
}

/// The PNG files written for one item.
///
/// Names alternate between two generations so a host that is still reading the previous image
/// never sees it overwritten. The previous generation is removed when it is superseded, and
/// whatever is left is removed when this is dropped.
#[derive(Debug)]
pub struct PixmapFiles {
    dir: PathBuf,
    stem: String,
    generation: u8,
    current: Option<PathBuf>,
    previous: Option<PathBuf>,
}

impl PixmapFiles {
    /// `stem` must be unique among all live items, e.g. derived from the process and item ids.
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self { dir: dir.into(), stem: stem.into(), generation: 0, current: None, previous: None }
    }

    /// The file currently displayed, if the last pixmap write succeeded.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn path_for(&self, generation: u8) -> PathBuf {
        self.dir.join(format!("{}-{}.png", self.stem, generation))
    }

    /// Write `pixmap` as the next generation, returning its path.
    pub fn write(&mut self, pixmap: &Pixmap) -> std::result::Result<PathBuf, IconError> {
        let generation = 1 - self.generation;
        let path = self.path_for(generation);

        // the previous generation shares its name with the one we're about to write
        if let Some(previous) = self.previous.take() {
            remove_icon_file(&previous);
        }

        let pixbuf = pixbuf_from_pixmap(pixmap)?;
        pixbuf.savev(&path, "png", &[]).map_err(|source| IconError::Write { path: path.clone(), source })?;

        self.generation = generation;
        self.previous = self.current.replace(path.clone());
        Ok(path)
    }
}

impl Drop for PixmapFiles {
    fn drop(&mut self) {
        for path in [self.current.take(), self.previous.take()].into_iter().flatten() {
            remove_icon_file(&path);
        }
    }
}

fn remove_icon_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::debug!("failed to remove {}: {}", path.display(), e);
        }
    }
}

fn pixbuf_from_pixmap(pixmap: &Pixmap) -> std::result::Result<Pixbuf, IconError> {
    let too_large = || IconError::PixmapTooLarge { width: pixmap.width, height: pixmap.height };
    let rowstride = pixmap.width.checked_mul(4).ok_or_else(too_large)?;

    let mut data = pixmap.data.clone();
    argb_to_rgba(&mut data);

    Ok(Pixbuf::from_bytes(
        &glib::Bytes::from_owned(data),
        Colorspace::Rgb,
        true,
        8,
        pixmap.width,
        pixmap.height,
        rowstride,
    ))
}
