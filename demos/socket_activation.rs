//! # Example: Socket Activation
//!
//! Three services under one supervisor:
//! - `greeter`: lazy, multi-instance, accepts connections; one process per client.
//! - `ticker`: started immediately, kept alive, exits cleanly every second.
//! - `broken`: kept alive but fails instantly; given up after the third fast failure.
//!
//! A client task connects to `greeter` twice, then the supervisor is stopped.
//! Run with `RUST_LOG=servisor=debug` for more detail.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;

use servisor::{LogWriter, MemorySource, Subscribe, Supervisor, SupervisorConfig, SystemAccounts};

fn write_script(path: &Path, body: &str) -> anyhow::Result<()> {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

async fn ask(path: &Path) -> anyhow::Result<String> {
    let mut stream = UnixStream::connect(path).await?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(reply)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "servisor=info".into()),
        )
        .init();

    let dir = std::env::temp_dir().join(format!("servisor-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let greet = dir.join("greet.sh");
    let tick = dir.join("tick.sh");
    let socket = dir.join("portal/greeter");
    write_script(&greet, r#"echo "hello from pid $$" >&3"#)?;
    write_script(&tick, "sleep 1")?;

    let source = MemorySource::new()
        .with_group(
            "greeter",
            [
                ("Executable", greet.to_str().unwrap_or_default()),
                ("Socket", socket.to_str().unwrap_or_default()),
                ("SocketPermissions", "0660"),
                ("Lazy", "true"),
                ("MultiInstance", "true"),
                ("AcceptSocketConnections", "true"),
            ],
        )
        .with_group(
            "ticker",
            [
                ("Executable", tick.to_str().unwrap_or_default()),
                ("KeepAlive", "true"),
                ("Priority", "low"),
            ],
        )
        .with_group(
            "broken",
            [("Executable", "/bin/false"), ("KeepAlive", "true")],
        )
        .with_group(
            "installer",
            [("Executable", "/bin/true"), ("BootModes", "text")],
        );

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mut sup = Supervisor::builder(SupervisorConfig::default())
        .with_subscribers(subs)
        .load(&source, &SystemAccounts)?
        .build()?;

    let token = sup.shutdown_token();
    let client_socket = socket.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        for _ in 0..2 {
            match ask(&client_socket).await {
                Ok(reply) => println!("[client] {}", reply.trim_end()),
                Err(err) => println!("[client] error: {err}"),
            }
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
    });

    sup.run().await?;
    println!("{}", sup.snapshot_json()?);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
