//  ██████╗  █████╗ ███████╗███████╗██╗███╗   ██╗ ██████╗
//  ██╔══██╗██╔══██╗██╔════╝██╔════╝██║████╗  ██║██╔════╝
//  ██████╔╝███████║███████╗███████╗██║██╔██╗ ██║██║  ███╗
//  ██╔═══╝ ██╔══██║╚════██║╚════██║██║██║╚██╗██║██║   ██║
//  ██║     ██║  ██║███████║███████║██║██║ ╚████║╚██████╔╝
//  ╚═╝     ╚═╝  ╚═╝╚══════╝╚══════╝╚═╝╚═╝  ╚═══╝ ╚═════╝

#[cfg(test)]
mod passing {
    use assert_cmd::prelude::*;
    use std::fs;
    use std::process::Command;

    const PAGE: &str = "<html><head><title>Page</title></head><body><p>Hello world</p></body></html>";

    fn command(dir: &std::path::Path) -> Command {
        let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
        // 隔离配置文件搜索和环境变量覆盖
        cmd.current_dir(dir).env_clear();
        cmd
    }

    #[test]
    fn overlay_to_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        fs::write(&input, PAGE).unwrap();

        let out = command(dir.path())
            .arg(&input)
            .args(["--echo-prefix", "X:"])
            .output()
            .unwrap();

        assert!(out.status.success());
        let stdout = String::from_utf8(out.stdout).unwrap();
        assert!(stdout.contains("<p>Hello world<web-translator-host"));
        assert!(stdout.contains("X:Hello world</web-translator-host>"));
        assert!(stdout.contains("data-web-translator-style"));
        // 标题不翻译
        assert!(stdout.contains("<title>Page</title>"));
    }

    #[test]
    fn replace_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        let output = dir.path().join("out.html");
        fs::write(&input, PAGE).unwrap();

        command(dir.path())
            .arg(&input)
            .args(["--echo-prefix", "X:", "-m", "replace", "-o"])
            .arg(&output)
            .assert()
            .success();

        let html = fs::read_to_string(&output).unwrap();
        assert!(html.contains("<p>X:Hello world</p>"));
        assert!(!html.contains("web-translator-host"));
    }

    #[test]
    fn selector_and_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        let config = dir.path().join("custom.toml");
        fs::write(
            &input,
            "<html><body><article><h2>Title here</h2></article></body></html>",
        )
        .unwrap();
        fs::write(&config, "[rule]\nmode = \"replace\"\n").unwrap();

        let out = command(dir.path())
            .arg(&input)
            .args(["--echo-prefix", "T:", "-s", "article h2", "-c"])
            .arg(&config)
            .output()
            .unwrap();

        assert!(out.status.success());
        let stdout = String::from_utf8(out.stdout).unwrap();
        assert!(stdout.contains("<h2>T:Title here</h2>"));
    }

    #[test]
    fn generate_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web-translator.toml");

        command(dir.path())
            .arg("--generate-config")
            .arg(&path)
            .assert()
            .success();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[rule]"));
        assert!(content.contains("[provider]"));
    }

    #[test]
    fn list_env() {
        let dir = tempfile::tempdir().unwrap();
        let out = command(dir.path()).arg("--list-env").output().unwrap();

        assert!(out.status.success());
        let stdout = String::from_utf8(out.stdout).unwrap();
        assert!(stdout.contains("WEB_TRANSLATOR_SELECTOR"));
        assert!(stdout.contains("WEB_TRANSLATOR_MODE"));
    }

    #[test]
    fn keeps_declared_charset() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(
            "<html><head><meta charset=\"windows-1252\"></head><body><p>Café ouvert</p></body></html>",
        );
        fs::write(&input, &bytes).unwrap();

        let out = command(dir.path())
            .arg(&input)
            .args(["--echo-prefix", "X:", "-m", "replace"])
            .output()
            .unwrap();

        assert!(out.status.success());
        let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&out.stdout);
        assert!(decoded.contains("<p>X:Café ouvert</p>"));
    }
}

//  ███████╗ █████╗ ██╗██╗     ██╗███╗   ██╗ ██████╗
//  ██╔════╝██╔══██╗██║██║     ██║████╗  ██║██╔════╝
//  █████╗  ███████║██║██║     ██║██╔██╗ ██║██║  ███╗
//  ██╔══╝  ██╔══██║██║██║     ██║██║╚██╗██║██║   ██║
//  ██║     ██║  ██║██║███████╗██║██║ ╚████║╚██████╔╝
//  ╚═╝     ╚═╝  ╚═╝╚═╝╚══════╝╚═╝╚═╝  ╚═══╝ ╚═════╝

#[cfg(test)]
mod failing {
    use assert_cmd::prelude::*;
    use std::process::Command;

    #[test]
    fn missing_input_argument() {
        let dir = tempfile::tempdir().unwrap();
        Command::cargo_bin(env!("CARGO_PKG_NAME"))
            .unwrap()
            .current_dir(dir.path())
            .env_clear()
            .assert()
            .failure();
    }

    #[test]
    fn unreadable_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = Command::cargo_bin(env!("CARGO_PKG_NAME"))
            .unwrap()
            .current_dir(dir.path())
            .env_clear()
            .args(["does-not-exist.html", "--echo-prefix", "X:"])
            .output()
            .unwrap();

        assert!(!out.status.success());
        assert!(String::from_utf8_lossy(&out.stderr).contains("Error"));
    }

    #[test]
    fn unknown_display_mode() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        std::fs::write(&input, "<p>Hello</p>").unwrap();

        Command::cargo_bin(env!("CARGO_PKG_NAME"))
            .unwrap()
            .current_dir(dir.path())
            .env_clear()
            .arg(&input)
            .args(["--echo-prefix", "X:", "-m", "sideways"])
            .assert()
            .failure();
    }
}
