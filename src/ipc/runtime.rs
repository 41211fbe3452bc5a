use directories::UserDirs;
use std::{fs, path::PathBuf};

pub fn runtime_dir() -> PathBuf {
    let home = UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    let dir = home.join(".local").join("run");
    let _ = fs::create_dir_all(&dir);
    dir
}

pub fn socket_path() -> PathBuf {
    runtime_dir().join("handmark.sock")
}
