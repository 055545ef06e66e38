use std::path::PathBuf;

pub fn get_file(name: &str) -> PathBuf {
    PathBuf::new()
        .join(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("nzbs")
        .join(name)
}

#[allow(dead_code)]
pub fn get_nzb_bytes(name: &str) -> Vec<u8> {
    std::fs::read(get_file(name)).unwrap()
}
