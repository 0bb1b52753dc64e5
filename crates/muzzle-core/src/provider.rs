//! Binary-unit providers: `symbol name -> compiled bytes | not found`.
//!
//! The collector reads internal units through one provider at build time and
//! every environment resolves shapes through its own provider at check time.
//! A missing unit is `Ok(None)`; only a failed read is an error.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::ProviderError;
use crate::names::resource_path;

/// A source of compiled units, looked up by dotted symbol name.
pub trait ClassProvider: Send + Sync {
    /// Returns the bytes of the unit for `name`, or `None` if there is none.
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError>;

    /// Presence check without keeping the bytes.
    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        Ok(self.find(name)?.is_some())
    }

    /// A short human-readable description, used in error messages.
    fn describe(&self) -> String;
}

impl<P: ClassProvider + ?Sized> ClassProvider for Arc<P> {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        (**self).find(name)
    }

    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        (**self).contains(name)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<P: ClassProvider + ?Sized> ClassProvider for Box<P> {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        (**self).find(name)
    }

    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        (**self).contains(name)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<P: ClassProvider + ?Sized> ClassProvider for &P {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        (**self).find(name)
    }

    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        (**self).contains(name)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Units held in a map. Used for fixtures and for pre-loaded bundles.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    units: HashMap<String, Vec<u8>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.units.insert(name.into(), bytes);
    }

    pub fn with(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl ClassProvider for InMemoryProvider {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        Ok(self.units.get(name).cloned())
    }

    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        Ok(self.units.contains_key(name))
    }

    fn describe(&self) -> String {
        format!("memory[{} units]", self.units.len())
    }
}

// ---------------------------------------------------------------------------
// Directory tree
// ---------------------------------------------------------------------------

/// A directory of `.class` files laid out by package (`a/b/C.class`).
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryProvider { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ClassProvider for DirectoryProvider {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let path = self.root.join(resource_path(name));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProviderError::Io {
                name: name.to_string(),
                location: path.display().to_string(),
                source,
            }),
        }
    }

    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        Ok(self.root.join(resource_path(name)).is_file())
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }
}

// ---------------------------------------------------------------------------
// Jar archive
// ---------------------------------------------------------------------------

/// A jar (zip) archive. Reads are serialized through a mutex because
/// `ZipArchive` needs `&mut` to seek.
pub struct JarProvider {
    path: PathBuf,
    archive: Mutex<ZipArchive<File>>,
}

impl JarProvider {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let path = path.into();
        let file = File::open(&path).map_err(|err| ProviderError::Archive {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let archive = ZipArchive::new(file).map_err(|err| ProviderError::Archive {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        tracing::debug!(path = %path.display(), entries = archive.len(), "opened jar");
        Ok(JarProvider {
            path,
            archive: Mutex::new(archive),
        })
    }
}

impl fmt::Debug for JarProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JarProvider").field("path", &self.path).finish()
    }
}

impl ClassProvider for JarProvider {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let entry_name = resource_path(name);
        let mut archive = self
            .archive
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entry = match archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => {
                return Err(ProviderError::Archive {
                    path: self.path.display().to_string(),
                    reason: format!("{entry_name}: {err}"),
                })
            }
        };
        let mut bytes = Vec::with_capacity(initial_capacity(entry.size()));
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| ProviderError::Io {
                name: name.to_string(),
                location: self.path.display().to_string(),
                source,
            })?;
        Ok(Some(bytes))
    }

    fn describe(&self) -> String {
        format!("jar:{}", self.path.display())
    }
}

/// Largest buffer reserved up front for a jar entry. The size comes from the
/// archive header and is not trusted beyond this; larger entries still grow
/// the buffer while reading.
const MAX_PREALLOCATION: usize = 1 << 20;

fn initial_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size)
        .unwrap_or(MAX_PREALLOCATION)
        .min(MAX_PREALLOCATION)
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// An ordered list of providers; the first one that has a unit wins.
#[derive(Default)]
pub struct CompositeProvider {
    entries: Vec<Box<dyn ClassProvider>>,
}

impl CompositeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, provider: impl ClassProvider + 'static) {
        self.entries.push(Box::new(provider));
    }

    /// Opens every classpath entry: `.jar`/`.zip` files as archives,
    /// anything else as a class directory.
    pub fn from_classpath<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ProviderError> {
        let mut composite = CompositeProvider::new();
        for path in paths {
            let path = path.as_ref();
            let is_archive = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"));
            if is_archive {
                composite.push(JarProvider::open(path)?);
            } else {
                composite.push(DirectoryProvider::new(path));
            }
        }
        Ok(composite)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CompositeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl ClassProvider for CompositeProvider {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        for entry in &self.entries {
            if let Some(bytes) = entry.find(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        for entry in &self.entries {
            if entry.contains(name)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.entries.iter().map(|e| e.describe()).collect();
        format!("[{}]", parts.join(", "))
    }
}
