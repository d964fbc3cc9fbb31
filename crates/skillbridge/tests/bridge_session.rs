//! Full sessions over real sockets, with in-memory pipes standing in for the simulator.

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpStream, UnixStream};

use skillbridge::bridge::peer::PeerChannel;
use skillbridge::bridge::text::TextChannel;
use skillbridge::bridge::transport::{BoundListener, Endpoint};
use skillbridge::diagnostics::Diagnostics;
use skillbridge::{Bridge, BridgeConfig, CloseReason, FileLayout, JsonFileStore, RequestSeq};

struct Simulator {
    input: DuplexStream,
    output: DuplexStream,
    console: DuplexStream,
}

impl Simulator {
    async fn answer(&mut self, body: &str) {
        let frame = format!("{}\n{}", body.len(), body);
        self.input.write_all(frame.as_bytes()).await.unwrap();
    }

    async fn read_expression(&mut self, len: usize) -> String {
        let mut buf = vec![0u8; len];
        self.output.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }
}

fn simulator_pipes() -> (
    TextChannel<DuplexStream, DuplexStream>,
    Diagnostics<DuplexStream>,
    Simulator,
) {
    let (input, bridge_in) = tokio::io::duplex(64 * 1024);
    let (bridge_out, output) = tokio::io::duplex(64 * 1024);
    let (bridge_err, console) = tokio::io::duplex(64 * 1024);
    (
        TextChannel::new(bridge_in, bridge_out),
        Diagnostics::new(bridge_err),
        Simulator {
            input,
            output,
            console,
        },
    )
}

fn config_in(root: &std::path::Path, endpoint: Endpoint) -> BridgeConfig {
    let config = BridgeConfig {
        endpoint,
        script_dir: root.join("script"),
        var_dir: root.join("vars"),
        result_dir: root.join("results"),
        debug: false,
        debug_delay: Duration::ZERO,
    };
    for dir in [&config.script_dir, &config.var_dir, &config.result_dir] {
        std::fs::create_dir_all(dir).unwrap();
    }
    config.validate().unwrap();
    config
}

#[tokio::test]
async fn hello_load_bogus_update_exit() {
    let root = tempfile::tempdir().unwrap();
    let socket = root.path().join("bridge.sock");
    let config = config_in(root.path(), Endpoint::Unix(socket.clone()));
    let layout = FileLayout::from_config(&config);
    std::fs::write(layout.initial_variables(), r#"{"w1": 2.0, "l1": 0.5}"#).unwrap();

    let bridge = Bridge::new(&config, JsonFileStore);
    let listener = BoundListener::bind(&config.endpoint).await.unwrap();
    assert!(socket.exists());

    let (text, diagnostics, mut sim) = simulator_pipes();
    sim.answer("HELLO").await;

    let optimizer = async {
        let mut client = PeerChannel::new(UnixStream::connect(&socket).await.unwrap());

        assert_eq!(
            client.recv_object().await.unwrap(),
            json!({"type": "info", "data": "HELLO"})
        );
        client
            .send_object(&json!({"type": "info", "data": "optimizer-1"}))
            .await
            .unwrap();
        let addr = client.recv_object().await.unwrap();
        assert_eq!(addr["type"], "info");

        client
            .send_object(&json!({"type": "loadSimulator", "data": null}))
            .await
            .unwrap();
        let expected = format!("loadSimulator( \"{}\" )", layout.load_script().display());
        assert_eq!(sim.read_expression(expected.len()).await, expected);
        sim.answer("loading...\nloadSimulator_OK").await;
        assert_eq!(
            client.recv_object().await.unwrap(),
            json!({"type": "loadSimulator", "data": {"w1": 2.0, "l1": 0.5}})
        );

        client.send_object(&json!({"type": "bogus"})).await.unwrap();
        assert_eq!(client.recv_object().await.unwrap()["type"], "error");

        client
            .send_object(&json!({"type": "updateAndRun", "data": {"w1": 2.2, "l1": 0.5}}))
            .await
            .unwrap();
        let vars = layout.variables_file(RequestSeq::new(1));
        let out = layout.results_file(RequestSeq::new(1));
        let expected = format!(
            "updateAndRun( \"{}\" \"RESULT_FILE={}\" 2)",
            vars.display(),
            out.display()
        );
        assert_eq!(sim.read_expression(expected.len()).await, expected);
        std::fs::write(&out, r#"{"gain": 41.5, "pm": 63.0}"#).unwrap();
        sim.answer("updateAndRun_OK").await;
        assert_eq!(
            client.recv_object().await.unwrap(),
            json!({"type": "updateAndRun", "data": {"gain": 41.5, "pm": 63.0}})
        );

        client
            .send_object(&json!({"type": "info", "data": "EXIT"}))
            .await
            .unwrap();
        sim
    };

    let (report, mut sim) = tokio::join!(bridge.run_with_listener(listener, text, diagnostics), optimizer);

    assert!(matches!(report.reason, CloseReason::Terminated), "{:?}", report.reason);
    assert_eq!(report.completed, RequestSeq::new(2));
    assert_eq!(report.handled, 4);
    assert!(!socket.exists());

    let mut console = String::new();
    sim.console.read_to_string(&mut console).await.unwrap();
    assert!(console.starts_with("Connected to client with the address optimizer-1\n"));
    assert!(console.contains("Error: request has no 'data' key\n"), "{console}");
    assert!(console.ends_with("Connection with the optimizer ended!\n\n"));
}

#[tokio::test]
async fn tcp_session_reports_listener_address() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(
        root.path(),
        Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
    );
    let bridge = Bridge::new(&config, JsonFileStore);
    let listener = BoundListener::bind(&config.endpoint).await.unwrap();
    let Endpoint::Tcp { port, .. } = listener.local_endpoint().unwrap() else {
        panic!("expected a TCP endpoint");
    };

    let (text, diagnostics, mut sim) = simulator_pipes();
    sim.answer("ready").await;

    let optimizer = async {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let local = stream.local_addr().unwrap();
        let mut client = PeerChannel::new(stream);

        assert_eq!(client.recv_object().await.unwrap()["data"], "ready");
        client
            .send_object(&json!({"type": "info", "data": ["127.0.0.1", local.port()]}))
            .await
            .unwrap();
        assert_eq!(
            client.recv_object().await.unwrap(),
            json!({"type": "info", "data": ["127.0.0.1", local.port()]})
        );
        client
            .send_object(&json!({"type": "info", "data": "exit"}))
            .await
            .unwrap();
    };

    let (report, ()) = tokio::join!(bridge.run_with_listener(listener, text, diagnostics), optimizer);

    assert!(matches!(report.reason, CloseReason::Terminated));
    assert_eq!(report.completed, RequestSeq::default());
}
