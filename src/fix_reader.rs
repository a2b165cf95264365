use crate::service::SyncService;
use crate::thread_manager::SteppableTask;
use crate::types::Fix;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FixParseError {
    #[error("Expected '<latitude> <longitude>', got '{0}'")]
    InvalidFormat(String),
    #[error("{axis} {value} is out of range")]
    OutOfRange { axis: &'static str, value: String },
}

/// Parses `<latitude> <longitude>` in decimal degrees, separated by whitespace or a comma.
pub fn parse_fix_line(
    line: &str,
    observed_at: chrono::DateTime<chrono::Utc>,
) -> Result<Fix, FixParseError> {
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty());
    let (Some(latitude), Some(longitude), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FixParseError::InvalidFormat(line.trim().to_string()));
    };

    let latitude = parse_axis("latitude", latitude, 90.0)?;
    let longitude = parse_axis("longitude", longitude, 180.0)?;
    Ok(Fix::new(latitude, longitude, observed_at))
}

fn parse_axis(axis: &'static str, text: &str, limit: f64) -> Result<f64, FixParseError> {
    let value: f64 = text
        .parse()
        .map_err(|_| FixParseError::InvalidFormat(text.to_string()))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(FixParseError::OutOfRange {
            axis,
            value: text.to_string(),
        });
    }
    Ok(value)
}

/// Feeds fixes read line by line from `reader` into the service. Blank lines and lines
/// starting with `#` are skipped. Ends at end of input.
pub struct FixReader<R> {
    reader: R,
    service: std::sync::Arc<SyncService>,
}

impl<R> FixReader<R>
where
    R: std::io::BufRead + Send + 'static,
{
    #[must_use]
    pub fn new(reader: R, service: std::sync::Arc<SyncService>) -> Self {
        FixReader { reader, service }
    }
}

impl<R> SteppableTask for FixReader<R>
where
    R: std::io::BufRead + Send + 'static,
{
    fn step(&mut self) -> bool {
        let mut line_buffer = String::new();

        let bytes_read = match self.reader.read_line(&mut line_buffer) {
            Ok(bytes_read) => bytes_read,
            Err(err) => {
                log::error!("FixReader: Failed to read line: {err}");
                return true;
            }
        };
        if bytes_read == 0 {
            log::info!("FixReader: End of input");
            return false;
        }

        let line = line_buffer.trim();
        if line.is_empty() || line.starts_with('#') {
            return true;
        }

        match parse_fix_line(line, chrono::Utc::now()) {
            Ok(fix) => {
                if let Err(err) = self.service.on_fix_received(&fix) {
                    log::warn!("FixReader: Fix not sent: {err}");
                }
            }
            Err(err) => log::warn!("FixReader: {err}"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_fix_line, FixParseError, FixReader};
    use crate::service::{ServiceSettings, SyncService};
    use crate::thread_manager::SteppableTask;
    use crate::types::LocalIdentity;

    #[test]
    fn when_line_is_space_separated_then_fix_is_parsed() {
        let now = chrono::Utc::now();
        let fix = parse_fix_line("40.786 -119.206", now).expect("Test should pass");

        assert!((fix.latitude - 40.786).abs() < 1e-12);
        assert!((fix.longitude + 119.206).abs() < 1e-12);
        assert_eq!(fix.observed_at, now);
    }

    #[test]
    fn when_line_is_comma_separated_then_fix_is_parsed() {
        let fix = parse_fix_line(" 37.765730, -122.41942 ", chrono::Utc::now())
            .expect("Test should pass");
        assert!((fix.latitude - 37.765730).abs() < 1e-12);
    }

    #[test]
    fn when_line_has_wrong_arity_then_invalid_format_is_returned() {
        let now = chrono::Utc::now();
        assert!(matches!(
            parse_fix_line("40.786", now),
            Err(FixParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_fix_line("1 2 3", now),
            Err(FixParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn when_latitude_is_out_of_range_then_error_names_axis() {
        let error = parse_fix_line("91.0 0.0", chrono::Utc::now()).unwrap_err();
        assert_eq!(
            error,
            FixParseError::OutOfRange {
                axis: "latitude",
                value: String::from("91.0"),
            }
        );
    }

    #[test]
    fn when_reading_input_then_fixes_reach_peer_and_reader_ends_at_eof() {
        let peer = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let peer_address = peer.local_addr().unwrap().to_string();
        let service = std::sync::Arc::new(SyncService::new(ServiceSettings {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            poll_interval: std::time::Duration::from_millis(20),
            ..ServiceSettings::default()
        }));
        service
            .start(
                LocalIdentity::new("K6ABC"),
                std::sync::Arc::new(move || peer_address.clone()),
            )
            .unwrap();

        let input = std::io::Cursor::new("# header\n\n40.786 -119.206\nnonsense\n");
        let mut reader = FixReader::new(input, service.clone());
        let mut steps = 0;
        while reader.step() {
            steps += 1;
        }
        service.stop().unwrap();

        assert_eq!(steps, 4);
        let mut buffer = [0u8; 1024];
        let mut received = Vec::new();
        for _ in 0..2 {
            let (len, _) = peer.recv_from(&mut buffer).unwrap();
            received.push(String::from_utf8(buffer[..len].to_vec()).unwrap());
        }
        assert_eq!(received[0], r#"{"type":"getall"}"#);
        assert!(received[1].contains(r#""lat":40786000"#));
    }
}
