//! Normalized absolute path value type.
//!
//! [`FilePath`] is the identifier every observer and download task is keyed
//! on. Two values naming the same location compare equal, hash equally and
//! sort by their normalized string form.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use walkdir::WalkDir;

/// Extension the remote sync provider gives not-yet-downloaded stand-ins.
const PLACEHOLDER_EXTENSION: &str = "icloud";

/// An immutable, normalized, absolute filesystem location.
#[derive(Clone)]
pub struct FilePath {
    inner: PathBuf,
}

impl FilePath {
    /// Create a path, resolving relative input against the working directory.
    ///
    /// Normalization is purely lexical; the filesystem is never consulted.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from(std::path::MAIN_SEPARATOR_STR))
                .join(path)
        };

        Self {
            inner: normalize(&absolute),
        }
    }

    /// The user's home directory, or the root if it cannot be determined.
    pub fn home() -> Self {
        Self::new(dirs::home_dir().unwrap_or_else(|| PathBuf::from(std::path::MAIN_SEPARATOR_STR)))
    }

    /// The user's documents directory, falling back to `~/Documents`.
    pub fn documents() -> Self {
        dirs::document_dir()
            .map(Self::new)
            .unwrap_or_else(|| Self::home() + "Documents")
    }

    pub fn as_path(&self) -> &Path {
        &self.inner
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.inner.clone()
    }

    /// Lossy string form, suitable for display and logging.
    pub fn to_string_lossy(&self) -> String {
        self.inner.to_string_lossy().into_owned()
    }

    /// Last path component, empty for the root.
    pub fn file_name(&self) -> String {
        self.inner
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Extension of the last component without the dot, empty if none.
    pub fn extension(&self) -> String {
        self.inner
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The containing directory. The root is its own parent.
    pub fn parent(&self) -> Self {
        match self.inner.parent() {
            Some(parent) => Self {
                inner: parent.to_path_buf(),
            },
            None => self.clone(),
        }
    }

    /// Append a component (or a relative sub-path) and normalize the result.
    pub fn join(&self, component: impl AsRef<Path>) -> Self {
        let component = component.as_ref();
        // An absolute component must not replace the base, unlike PathBuf::join.
        let relative: PathBuf = component
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        Self {
            inner: normalize(&self.inner.join(relative)),
        }
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &FilePath) -> bool {
        self != ancestor && self.inner.starts_with(&ancestor.inner)
    }

    pub fn exists(&self) -> bool {
        self.inner.exists()
    }

    pub fn is_dir(&self) -> bool {
        self.inner.is_dir()
    }

    /// Whether the name has the `.name.icloud` shape of a remote stand-in.
    pub fn is_placeholder_name(&self) -> bool {
        self.file_name().starts_with('.') && self.extension() == PLACEHOLDER_EXTENSION
    }

    /// Map a placeholder name to the name of the item it stands in for.
    ///
    /// `dir/.report.pdf.icloud` becomes `dir/report.pdf`; any other path is
    /// returned unchanged.
    pub fn without_placeholder(&self) -> Self {
        if !self.is_placeholder_name() {
            return self.clone();
        }
        let stem = self
            .inner
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = stem.strip_prefix('.').unwrap_or(&stem);
        self.parent() + name
    }

    /// Direct entries of this directory, sorted. Empty if unreadable.
    pub fn children(&self) -> Vec<FilePath> {
        let Ok(entries) = std::fs::read_dir(&self.inner) else {
            return Vec::new();
        };
        let mut paths: Vec<FilePath> = entries
            .filter_map(Result::ok)
            .map(|entry| FilePath::new(entry.path()))
            .collect();
        paths.sort();
        paths
    }

    /// Every descendant of this directory, sorted. Unreadable entries are skipped.
    pub fn recursive_children(&self) -> Vec<FilePath> {
        let mut paths: Vec<FilePath> = WalkDir::new(&self.inner)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| FilePath::new(entry.path()))
            .collect();
        paths.sort();
        paths
    }

    /// Keep only the paths whose extension equals `extension`.
    pub fn filter_extension<'a>(
        paths: impl IntoIterator<Item = &'a FilePath>,
        extension: &str,
    ) -> Vec<FilePath> {
        paths
            .into_iter()
            .filter(|path| path.extension() == extension)
            .cloned()
            .collect()
    }

    fn key(&self) -> &OsStr {
        self.inner.as_os_str()
    }
}

/// Lexically normalize an absolute path.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // pop() refuses to remove the root
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

impl PartialEq for FilePath {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for FilePath {}

impl Hash for FilePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for FilePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FilePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(other.key())
    }
}

impl fmt::Debug for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePath").field(&self.inner).finish()
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.display())
    }
}

impl AsRef<Path> for FilePath {
    fn as_ref(&self) -> &Path {
        &self.inner
    }
}

impl From<PathBuf> for FilePath {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for FilePath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for FilePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl Add<&str> for FilePath {
    type Output = FilePath;

    fn add(self, component: &str) -> FilePath {
        self.join(component)
    }
}

impl Add<&str> for &FilePath {
    type Output = FilePath;

    fn add(self, component: &str) -> FilePath {
        self.join(component)
    }
}

impl AddAssign<&str> for FilePath {
    fn add_assign(&mut self, component: &str) {
        *self = self.join(component);
    }
}

impl Serialize for FilePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PathBuf::deserialize(deserializer).map(FilePath::new)
    }
}
