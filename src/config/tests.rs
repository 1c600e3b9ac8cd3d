use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.mode, RunMode::Production);
    assert_eq!(settings.paths.output_dir, PathBuf::from("dist"));
    assert_eq!(
        settings.paths.template,
        PathBuf::from("dist").join("index.template.html")
    );
    assert_eq!(settings.render.page_title, "Vue Music");
    assert_eq!(settings.render.fragment_cache_capacity.get(), 1000);
    assert_eq!(settings.render.fragment_cache_ttl, Duration::from_secs(900));
    assert_eq!(settings.snapshot.routes, vec!["/", "/all"]);
    assert_eq!(settings.dev.poll_interval, Duration::from_millis(500));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.mode = Some("production".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        mode: Some("development".to_string()),
        paths: PathOverrides {
            output_dir: Some(PathBuf::from("build")),
            template: None,
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.mode, RunMode::Development);
    assert_eq!(
        settings.paths.template,
        PathBuf::from("build").join("index.template.html")
    );
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn rejects_invalid_values() {
    let cases: Vec<(&str, Box<dyn Fn(&mut RawSettings)>)> = vec![
        ("server.port", Box::new(|raw: &mut RawSettings| raw.server.port = Some(0))),
        ("mode", Box::new(|raw: &mut RawSettings| raw.mode = Some("staging".into()))),
        (
            "render.fragment_cache_capacity",
            Box::new(|raw: &mut RawSettings| raw.render.fragment_cache_capacity = Some(0)),
        ),
        (
            "render.fragment_cache_ttl_seconds",
            Box::new(|raw: &mut RawSettings| raw.render.fragment_cache_ttl_seconds = Some(0)),
        ),
        (
            "snapshot.routes",
            Box::new(|raw: &mut RawSettings| raw.snapshot.routes = Some(vec!["all".into()])),
        ),
        (
            "dev.poll_interval_ms",
            Box::new(|raw: &mut RawSettings| raw.dev.poll_interval_ms = Some(0)),
        ),
        (
            "logging.level",
            Box::new(|raw: &mut RawSettings| raw.logging.level = Some("loud".into())),
        ),
    ];

    for (expected, mutate) in cases {
        let mut raw = RawSettings::default();
        mutate(&mut raw);
        match Settings::from_raw(raw) {
            Err(LoadError::Invalid { key, .. }) => assert_eq!(key, expected),
            other => panic!("expected invalid `{expected}`, got {other:?}"),
        }
    }
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["streamsnap"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "streamsnap",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--mode",
        "development",
        "--output-dir",
        "/srv/dist",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.mode.as_deref(), Some("development"));
            assert_eq!(
                serve.overrides.paths.output_dir.as_deref(),
                Some(std::path::Path::new("/srv/dist"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_prerender_arguments() {
    let args = CliArgs::parse_from(["streamsnap", "prerender", "--force", "--template", "shell.html"]);

    match args.command.expect("prerender command") {
        Command::Prerender(prerender) => {
            assert!(prerender.force);
            assert_eq!(
                prerender.paths.template.as_deref(),
                Some(std::path::Path::new("shell.html"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
