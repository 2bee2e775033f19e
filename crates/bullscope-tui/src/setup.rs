//! Interactive connection prompt, shown before the terminal UI when no
//! host was configured.

use std::io::{BufRead, Write};

use bullscope_queue::ConnectionConfig;

use crate::error::{TuiError, TuiResult};

/// Ask for host, port and password on `output`, reading answers from
/// `input`. Empty answers keep the values in `base`.
pub fn prompt_connection<R, W>(
    mut input: R,
    mut output: W,
    mut base: ConnectionConfig,
) -> TuiResult<ConnectionConfig>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "Connect to Redis")?;

    let host = ask(&mut input, &mut output, &format!("Host [{}]: ", base.host))?;
    if !host.is_empty() {
        base.host = host;
    }

    let port = ask(&mut input, &mut output, &format!("Port [{}]: ", base.port))?;
    if !port.is_empty() {
        base.port = port
            .parse()
            .map_err(|_| TuiError::config(format!("invalid port: {}", port)))?;
    }

    let password = ask(&mut input, &mut output, "Password (empty for none): ")?;
    if !password.is_empty() {
        base.password = Some(password);
    }

    base.validate()?;
    Ok(base)
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> TuiResult<String> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio_test::assert_ok;

    #[test]
    fn test_answers_override_defaults() {
        let input = Cursor::new("redis.local\n6380\ns3cret\n");
        let mut output = Vec::new();
        let config = assert_ok!(prompt_connection(input, &mut output, ConnectionConfig::default()));

        assert_eq!(config.host, "redis.local");
        assert_eq!(config.port, 6380);
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        assert!(String::from_utf8(output).unwrap().contains("Host [localhost]: "));
    }

    #[test]
    fn test_blank_answers_keep_defaults() {
        let config = assert_ok!(prompt_connection(
            Cursor::new("\n\n\n"),
            Vec::new(),
            ConnectionConfig::default()
        ));
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_invalid_port_is_a_config_error() {
        let result = prompt_connection(
            Cursor::new("localhost\nnot-a-port\n\n"),
            Vec::new(),
            ConnectionConfig::default(),
        );
        assert!(matches!(result, Err(TuiError::Config(_))));
    }
}
