use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;

use crate::config::TlsSettings;

pub fn load_tls_acceptor(settings: &TlsSettings) -> io::Result<Option<TlsAcceptor>> {
    match settings {
        TlsSettings::Disabled => Ok(None),
        TlsSettings::Enabled { cert, key } => build_acceptor(cert, key).map(Some),
    }
}

fn build_acceptor(cert_path: &Path, key_path: &Path) -> io::Result<TlsAcceptor> {
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("no certificates found in {}", cert_path.display()),
        ));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;

    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_yields_no_acceptor() {
        assert!(load_tls_acceptor(&TlsSettings::Disabled).unwrap().is_none());
    }

    #[test]
    fn missing_files_are_errors() {
        let settings = TlsSettings::Enabled {
            cert: "/nonexistent/daybook/cert.pem".into(),
            key: "/nonexistent/daybook/key.pem".into(),
        };
        let err = load_tls_acceptor(&settings).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn empty_cert_file_is_rejected() {
        let dir = std::env::temp_dir().join("daybook_test_tls");
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("empty_cert.pem");
        std::fs::write(&cert, b"").unwrap();
        let settings = TlsSettings::Enabled {
            cert: cert.clone(),
            key: dir.join("missing_key.pem"),
        };
        let err = load_tls_acceptor(&settings).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
