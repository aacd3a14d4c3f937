use mcpr_domain::config::{RouterConfig, TransportKind};

#[test]
fn full_entry_parses() {
    let raw = r#"
    {
      "mcpServers": {
        "weather": {
          "type": "stdio",
          "command": "npx",
          "args": ["-y", "@example/weather-mcp"],
          "env": { "API_KEY": "secret" },
          "cwd": "/srv/weather",
          "disabled": false,
          "timeout": 30000
        }
      }
    }
    "#;
    let config = RouterConfig::from_json(raw).unwrap();
    let servers = config.enabled_servers();
    assert_eq!(servers.len(), 1);

    let weather = &servers[0];
    assert_eq!(weather.alias, "weather");
    assert_eq!(weather.command, "npx");
    assert_eq!(weather.args, vec!["-y", "@example/weather-mcp"]);
    assert_eq!(weather.env.get("API_KEY").unwrap(), "secret");
    assert_eq!(weather.cwd.as_ref().unwrap().to_str().unwrap(), "/srv/weather");
    assert_eq!(weather.timeout.unwrap().as_millis(), 30000);
}

#[test]
fn optional_fields_default() {
    let raw = r#"
    { "mcpServers": { "s": { "type": "stdio", "command": "srv", "args": [] } } }
    "#;
    let config = RouterConfig::from_json(raw).unwrap();
    let servers = config.enabled_servers();
    assert_eq!(servers.len(), 1);
    assert!(servers[0].env.is_empty());
    assert!(servers[0].cwd.is_none());
    assert!(servers[0].timeout.is_none());
}

#[test]
fn file_order_is_preserved() {
    let raw = r#"
    {
      "mcpServers": {
        "zeta":  { "type": "stdio", "command": "z", "args": [] },
        "alpha": { "type": "stdio", "command": "a", "args": [] },
        "mid":   { "type": "stdio", "command": "m", "args": [] }
      }
    }
    "#;
    let config = RouterConfig::from_json(raw).unwrap();
    let aliases: Vec<String> = config
        .enabled_servers()
        .into_iter()
        .map(|s| s.alias)
        .collect();
    assert_eq!(aliases, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn disabled_entries_are_skipped() {
    let raw = r#"
    {
      "mcpServers": {
        "on":  { "type": "stdio", "command": "a", "args": [] },
        "off": { "type": "stdio", "command": "b", "args": [], "disabled": true }
      }
    }
    "#;
    let config = RouterConfig::from_json(raw).unwrap();
    assert_eq!(config.server_count(), 2);
    let servers = config.enabled_servers();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].alias, "on");
}

#[test]
fn unsupported_transport_is_skipped_not_fatal() {
    let raw = r#"
    {
      "mcpServers": {
        "sse":   { "type": "sse", "command": "x", "args": [] },
        "good":  { "type": "stdio", "command": "y", "args": [] }
      }
    }
    "#;
    let config = RouterConfig::from_json(raw).unwrap();
    let servers = config.enabled_servers();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].alias, "good");
}

#[test]
fn unknown_keys_are_ignored() {
    let raw = r#"
    {
      "futureFlag": true,
      "mcpServers": {
        "s": { "type": "stdio", "command": "srv", "args": [], "somethingNew": 42 }
      }
    }
    "#;
    let config = RouterConfig::from_json(raw).unwrap();
    assert_eq!(config.enabled_servers().len(), 1);
}

#[test]
fn missing_type_is_fatal() {
    let raw = r#"{ "mcpServers": { "s": { "command": "srv", "args": [] } } }"#;
    assert!(RouterConfig::from_json(raw).is_err());
}

#[test]
fn missing_command_is_fatal() {
    let raw = r#"{ "mcpServers": { "s": { "type": "stdio", "args": [] } } }"#;
    let err = RouterConfig::from_json(raw).unwrap_err();
    assert!(err.to_string().contains("'s'"));
}

#[test]
fn malformed_document_is_fatal() {
    assert!(RouterConfig::from_json("{ not json").is_err());
}

#[test]
fn empty_document_yields_no_servers() {
    let config = RouterConfig::from_json("{}").unwrap();
    assert_eq!(config.server_count(), 0);
    assert!(config.enabled_servers().is_empty());
}

#[test]
fn transport_kind_other_values_parse_as_unsupported() {
    let kind: TransportKind = serde_json::from_str("\"websocket\"").unwrap();
    assert_eq!(kind, TransportKind::Unsupported);
    let kind: TransportKind = serde_json::from_str("\"stdio\"").unwrap();
    assert_eq!(kind, TransportKind::Stdio);
}
