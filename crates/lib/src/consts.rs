//! Fixed names and defaults shared across plan assembly, rendering and archiving.

pub const APP_NAME: &str = "plainpack";

/// Base image every plan starts from. Not configurable.
pub const BASE_IMAGE: &str = "buildpack-deps:bionic";

/// Name of the instruction document inside the build context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Prefix under which the project source tree is placed in the build context.
pub const SOURCE_PREFIX: &str = "src";

/// Prefix under which staged manifest files are placed in the build context.
pub const STAGED_FILES_PREFIX: &str = "files";

/// Environment variable recording the start script for container start time.
pub const ENTRYPOINT_MARKER_VAR: &str = "R2D_ENTRYPOINT";

pub const DEFAULT_REPO_DIR: &str = "${REPO_DIR}";
pub const DEFAULT_OWNER: &str = "${NB_USER}";
pub const ROOT_USER: &str = "root";

/// Build args that parameterize archive ownership.
pub const UID_BUILD_ARG: &str = "NB_UID";
pub const GID_BUILD_ARG: &str = "NB_GID";
pub const DEFAULT_UID: u64 = 1000;

/// Timestamp stamped on every archive entry.
/// 315532800 = January 1, 1980 00:00:00 UTC (ZIP epoch)
pub const NORMALIZED_MTIME: u64 = 315_532_800;

pub const CONFIG_FILENAME: &str = "plainpack.toml";
pub const APT_FILENAME: &str = "apt.txt";
pub const POST_BUILD_FILENAME: &str = "postBuild";
pub const START_FILENAME: &str = "start";

/// Candidate configuration directories, checked in order before the project root.
pub const BINDER_DIRS: &[&str] = &["binder", ".binder"];

pub const DEFAULT_ENGINE_URL: &str = "http://localhost:2375";
pub const ENGINE_ENV_VAR: &str = "PLAINPACK_ENGINE";
pub const DOCKER_HOST_ENV_VAR: &str = "DOCKER_HOST";
