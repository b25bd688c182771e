//! AddTwoInts service demo.
//!
//! Both ends of the service run inside this process, joined by the loopback
//! bus: the selected role drives the demo and prints its side of the
//! exchange, the counterpart is simulated.

use std::{
  path::PathBuf,
  process::ExitCode,
  sync::{Arc, Condvar, Mutex},
  thread,
  time::Duration,
};

use clap::{Parser, ValueEnum};
use serde_json::json;

use dds_rpc_enabler::{
  enabler::DdsEnabler,
  loopback::LoopbackBus,
  types::{DynamicType, JsonTypeSupport},
  CallbackSet, EnablerConfiguration, Protocol, ServiceInfo, TopicInfo,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Role {
  Client,
  Server,
}

#[derive(Parser)]
#[command(about = "AddTwoInts service demo over the in-process loopback bus")]
struct Args {
  /// Which side this process plays; the counterpart is simulated in-process.
  #[arg(value_enum)]
  role: Role,

  /// Configuration file. Accepted for compatibility; the loopback demo has
  /// nothing to configure from it.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Service to announce and call.
  #[arg(long, default_value = "add_two_ints")]
  service_name: String,

  /// Give up after this many seconds.
  #[arg(long, default_value_t = 10)]
  timeout: u64,

  /// Directory where received type descriptions are persisted.
  #[arg(long)]
  persistence_path: Option<PathBuf>,

  /// Number of requests to exchange.
  #[arg(long, default_value_t = 5)]
  expected_requests: u32,

  /// Delay before the first request, in seconds.
  #[arg(long, default_value_t = 0)]
  request_initial_wait: u64,
}

fn topic_info(type_name: &str) -> TopicInfo {
  TopicInfo {
    type_name: type_name.to_string(),
    serialized_qos: String::new(),
  }
}

fn register_types(enabler: &Arc<DdsEnabler>) {
  for (type_name, idl, placeholder) in [
    (
      "example_interfaces::srv::dds_::AddTwoInts_Request_",
      "struct AddTwoInts_Request { int64 a; int64 b; };",
      json!({"a": 0, "b": 0}),
    ),
    (
      "example_interfaces::srv::dds_::AddTwoInts_Response_",
      "struct AddTwoInts_Response { int64 sum; };",
      json!({"sum": 0}),
    ),
  ] {
    let support = JsonTypeSupport::new(type_name, idl, placeholder);
    let type_id = support.identifier();
    enabler.add_schema(Arc::new(support) as DynamicType, type_id);
  }
}

fn main() -> ExitCode {
  pretty_env_logger::init();
  let args = Args::parse();

  if let Some(config) = &args.config {
    println!("Configuration file {} accepted (loopback demo, nothing to load).", config.display());
  }

  let bus = LoopbackBus::new();
  let service_name = args.service_name.clone();

  // Server side: announce, answer each request with the sum.
  let server_slot: Arc<Mutex<Option<Arc<DdsEnabler>>>> = Arc::default();
  let server = {
    let mut callbacks = CallbackSet::default();
    let name = service_name.clone();
    callbacks.service.service_query = Some(Box::new(move |queried| {
      (queried == name).then(|| ServiceInfo {
        request: topic_info("example_interfaces::srv::dds_::AddTwoInts_Request_"),
        reply: topic_info("example_interfaces::srv::dds_::AddTwoInts_Response_"),
      })
    }));

    let slot = Arc::clone(&server_slot);
    let verbose = args.role == Role::Server;
    callbacks.service.service_request_notification =
      Some(Box::new(move |service, json, request_id, _publish_time| {
        let value: serde_json::Value = serde_json::from_str(json).unwrap_or_default();
        let sum = value["a"].as_i64().unwrap_or(0) + value["b"].as_i64().unwrap_or(0);
        if verbose {
          println!("[server] request {request_id}: {json} -> sum {sum}");
        }
        if let Some(enabler) = slot.lock().unwrap().clone() {
          if let Err(e) =
            enabler.send_service_reply(service, &json!({ "sum": sum }).to_string(), request_id)
          {
            eprintln!("[server] reply failed: {e}");
          }
        }
      }));

    let enabler = DdsEnabler::new(EnablerConfiguration::default(), callbacks, bus.clone(), None);
    register_types(&enabler);
    bus.join("server", &enabler);
    *server_slot.lock().unwrap() = Some(Arc::clone(&enabler));
    enabler
  };

  // Client side: count replies, wake the main thread when done.
  let done: Arc<(Mutex<u32>, Condvar)> = Arc::new((Mutex::new(0), Condvar::new()));
  let client = {
    let mut callbacks = CallbackSet::default();

    if let Some(dir) = args.persistence_path.clone() {
      callbacks.dds.type_notification =
        Some(Box::new(move |type_name, idl, _blob, placeholder| {
          let base = dir.join(type_name.replace("::", "_"));
          let _ = std::fs::create_dir_all(&dir);
          let _ = std::fs::write(base.with_extension("idl"), idl);
          let _ = std::fs::write(base.with_extension("json"), placeholder);
        }));
    }

    let counter = Arc::clone(&done);
    let verbose = args.role == Role::Client;
    callbacks.service.service_reply_notification =
      Some(Box::new(move |_service, json, request_id, _publish_time| {
        if verbose {
          println!("[client] reply {request_id}: {json}");
        }
        let (count, cv) = &*counter;
        *count.lock().unwrap() += 1;
        cv.notify_all();
      }));

    let enabler = DdsEnabler::new(EnablerConfiguration::default(), callbacks, bus.clone(), None);
    register_types(&enabler);
    bus.join("client", &enabler);
    enabler
  };

  if let Err(e) = server.announce_service(&service_name, Protocol::Ros2) {
    eprintln!("Cannot announce service {service_name}: {e}");
    return ExitCode::FAILURE;
  }
  thread::sleep(Duration::from_millis(100)); // let discovery settle

  if args.request_initial_wait > 0 {
    thread::sleep(Duration::from_secs(args.request_initial_wait));
  }

  for n in 0..args.expected_requests {
    let request = json!({"a": n, "b": n + 1}).to_string();
    match client.send_service_request(&service_name, &request) {
      Ok(request_id) => {
        if args.role == Role::Client {
          println!("[client] sent request {request_id}: {request}");
        }
      }
      Err(e) => {
        eprintln!("Request failed: {e}");
        return ExitCode::FAILURE;
      }
    }
  }

  let (count, cv) = &*done;
  let guard = count.lock().unwrap();
  let (guard, timeout) = cv
    .wait_timeout_while(guard, Duration::from_secs(args.timeout), |count| {
      *count < args.expected_requests
    })
    .unwrap();
  if timeout.timed_out() && *guard < args.expected_requests {
    eprintln!("Timed out: {}/{} replies received.", *guard, args.expected_requests);
    return ExitCode::FAILURE;
  }

  println!("All {} requests answered.", args.expected_requests);
  ExitCode::SUCCESS
}
