//! 使用者設定的證券代碼，存成資料目錄下的純文字檔

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};

use crate::declare::SecurityCode;

const STOCK_CODE_FILE: &str = "config.txt";

pub fn path_in(dir: &Path) -> PathBuf {
    dir.join(STOCK_CODE_FILE)
}

/// 讀取已存的代碼，沒有設定或只有空白時回傳 None
pub fn load(dir: &Path) -> Result<Option<String>> {
    let path = path_in(dir);
    match fs::read_to_string(&path) {
        Ok(text) => {
            let code = text.trim();
            Ok((!code.is_empty()).then(|| code.to_string()))
        }
        Err(why) if why.kind() == ErrorKind::NotFound => Ok(None),
        Err(why) => Err(why).with_context(|| format!("Failed to read {:?}", path)),
    }
}

/// 儲存代碼，會先去除前後空白並檢查格式
pub fn save(dir: &Path, code: &str) -> Result<SecurityCode> {
    let code = code.trim();
    if code.is_empty() {
        return Err(anyhow!("Security code must not be empty"));
    }

    let parsed = code
        .parse::<SecurityCode>()
        .map_err(|why| anyhow!("{}, expected something like sz302132 or sh600745", why))?;

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = path_in(dir);
    fs::write(&path, parsed.as_str()).with_context(|| format!("Failed to write {:?}", path))?;

    Ok(parsed)
}
