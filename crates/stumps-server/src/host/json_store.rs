//! JSON file storage.
//!
//! Layout under the root directory:
//! - `<serverId>.server` - server descriptor
//! - `<serverId>/stumps/<stumpId>.stump` - stump descriptor
//! - `<serverId>/stumps/<stumpId>.{orequest,oresponse,response}.body` - body blobs

use super::data_access::{
    assign_resource_names, next_sequence, original_request_resource, original_response_resource,
    response_resource, sort_by_sequence, validate_name, DataAccess, DataAccessError, ServerEntity,
    StumpBodies, StumpEntity,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const SERVER_EXTENSION: &str = "server";
const STUMP_EXTENSION: &str = "stump";
const STUMPS_DIRECTORY: &str = "stumps";

pub struct JsonFileDataAccess {
    root: PathBuf,
}

impl JsonFileDataAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn server_file(&self, server_id: &str) -> Result<PathBuf, DataAccessError> {
        let id = validate_name(server_id)?;
        Ok(self.root.join(format!("{id}.{SERVER_EXTENSION}")))
    }

    fn server_directory(&self, server_id: &str) -> Result<PathBuf, DataAccessError> {
        Ok(self.root.join(validate_name(server_id)?))
    }

    fn stumps_directory(&self, server_id: &str) -> Result<PathBuf, DataAccessError> {
        Ok(self.server_directory(server_id)?.join(STUMPS_DIRECTORY))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DataAccessError + '_ {
    move |source| DataAccessError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DataAccessError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| DataAccessError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_error(path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DataAccessError> {
    let contents = fs::read(path).map_err(io_error(path))?;
    serde_json::from_slice(&contents).map_err(|source| DataAccessError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a file, `None` if it does not exist.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, DataAccessError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

fn remove_file_if_exists(path: &Path) -> Result<(), DataAccessError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// Files in `directory` with the given extension, sorted by name.
fn files_with_extension(directory: &Path, extension: &str) -> Result<Vec<PathBuf>, DataAccessError> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(directory)(e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_error(directory))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl DataAccess for JsonFileDataAccess {
    fn server_create(&self, server: &ServerEntity) -> Result<(), DataAccessError> {
        let file = self.server_file(&server.server_id)?;
        let stumps = self.stumps_directory(&server.server_id)?;
        fs::create_dir_all(&stumps).map_err(io_error(&stumps))?;
        write_json(&file, server)?;
        debug!("Stored server {} at {}", server.server_id, file.display());
        Ok(())
    }

    fn server_delete(&self, server_id: &str) -> Result<(), DataAccessError> {
        remove_file_if_exists(&self.server_file(server_id)?)?;
        let directory = self.server_directory(server_id)?;
        match fs::remove_dir_all(&directory) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&directory)(e)),
        }
    }

    fn server_find(&self, server_id: &str) -> Result<Option<ServerEntity>, DataAccessError> {
        let file = self.server_file(server_id)?;
        if !file.is_file() {
            return Ok(None);
        }
        read_json(&file).map(Some)
    }

    fn server_find_all(&self) -> Result<Vec<ServerEntity>, DataAccessError> {
        files_with_extension(&self.root, SERVER_EXTENSION)?
            .iter()
            .map(|path| read_json(path))
            .collect()
    }

    fn server_read_resource(
        &self,
        server_id: &str,
        resource_name: &str,
    ) -> Result<Option<Vec<u8>>, DataAccessError> {
        let path = self
            .stumps_directory(server_id)?
            .join(validate_name(resource_name)?);
        read_optional(&path)
    }

    fn stump_create(
        &self,
        server_id: &str,
        mut stump: StumpEntity,
        bodies: StumpBodies<'_>,
    ) -> Result<StumpEntity, DataAccessError> {
        let stump_id = validate_name(&stump.stump_id)?.to_string();
        let directory = self.stumps_directory(server_id)?;
        fs::create_dir_all(&directory).map_err(io_error(&directory))?;
        stump.sequence = next_sequence(&self.stump_find_all(server_id)?, &stump_id);

        assign_resource_names(&mut stump, &bodies);
        let blobs = [
            (original_request_resource(&stump_id), bodies.original_request),
            (original_response_resource(&stump_id), bodies.original_response),
            (response_resource(&stump_id), bodies.response),
        ];
        for (name, bytes) in blobs {
            let path = directory.join(name);
            if bytes.is_empty() {
                remove_file_if_exists(&path)?;
            } else {
                fs::write(&path, bytes).map_err(io_error(&path))?;
            }
        }

        write_json(&directory.join(format!("{stump_id}.{STUMP_EXTENSION}")), &stump)?;
        Ok(stump)
    }

    fn stump_delete(&self, server_id: &str, stump_id: &str) -> Result<(), DataAccessError> {
        let stump_id = validate_name(stump_id)?;
        let directory = self.stumps_directory(server_id)?;
        for name in [
            format!("{stump_id}.{STUMP_EXTENSION}"),
            original_request_resource(stump_id),
            original_response_resource(stump_id),
            response_resource(stump_id),
        ] {
            remove_file_if_exists(&directory.join(name))?;
        }
        Ok(())
    }

    fn stump_find_all(&self, server_id: &str) -> Result<Vec<StumpEntity>, DataAccessError> {
        let mut stumps = files_with_extension(&self.stumps_directory(server_id)?, STUMP_EXTENSION)?
            .iter()
            .map(|path| read_json(path))
            .collect::<Result<Vec<StumpEntity>, _>>()?;
        sort_by_sequence(&mut stumps);
        Ok(stumps)
    }
}
