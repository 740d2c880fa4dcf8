pub mod datetime;
pub mod http;
pub mod text;

/// reqwest 使用 rustls-no-provider，程式啟動時必須先安裝 ring
pub fn ensure_rustls_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }

    // 已被其他地方搶先安裝時會回傳 Err，可以忽略
    let _ = rustls::crypto::ring::default_provider().install_default();
}
