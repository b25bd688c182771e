//! Fibonacci action demo.
//!
//! Both ends of the action run inside this process, joined by the loopback
//! bus. The server computes the sequence step by step with feedback; the
//! client can cancel mid-way with `--cancel-requests true`.

use std::{
  path::PathBuf,
  process::ExitCode,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
  },
  thread,
  time::Duration,
};

use clap::{Parser, ValueEnum};
use serde_json::json;

use dds_rpc_enabler::{
  enabler::DdsEnabler,
  loopback::LoopbackBus,
  rpc::CancelCode,
  types::{DynamicType, JsonTypeSupport},
  CallbackSet, EnablerConfiguration, ServiceInfo, StatusCode, TopicInfo,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Role {
  Client,
  Server,
}

#[derive(Parser)]
#[command(about = "Fibonacci action demo over the in-process loopback bus")]
struct Args {
  /// Which side this process plays; the counterpart is simulated in-process.
  #[arg(value_enum)]
  role: Role,

  /// Configuration file. Accepted for compatibility; the loopback demo has
  /// nothing to configure from it.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Action to announce and call. ROS2 action names end in `/_action/`.
  #[arg(long, default_value = "fibonacci/_action/")]
  action_name: String,

  /// Fibonacci order requested by the client.
  #[arg(long, default_value_t = 8)]
  expected_requests: u32,

  /// Give up after this many seconds.
  #[arg(long, default_value_t = 20)]
  timeout: u64,

  /// Directory where received type descriptions are persisted.
  #[arg(long)]
  persistence_path: Option<PathBuf>,

  /// Delay before the goal is sent, in seconds.
  #[arg(long, default_value_t = 0)]
  request_initial_wait: u64,

  /// Cancel the goal after the second feedback item.
  #[arg(long, default_value_t = false)]
  cancel_requests: bool,
}

fn topic_info(type_name: &str) -> TopicInfo {
  TopicInfo {
    type_name: type_name.to_string(),
    serialized_qos: String::new(),
  }
}

fn service_info(request_type: &str, reply_type: &str) -> ServiceInfo {
  ServiceInfo {
    request: topic_info(request_type),
    reply: topic_info(reply_type),
  }
}

fn action_types() -> dds_rpc_enabler::ActionInfo {
  dds_rpc_enabler::ActionInfo {
    goal: service_info(
      "example_interfaces::action::dds_::Fibonacci_SendGoal_Request_",
      "example_interfaces::action::dds_::Fibonacci_SendGoal_Response_",
    ),
    result: service_info(
      "example_interfaces::action::dds_::Fibonacci_GetResult_Request_",
      "example_interfaces::action::dds_::Fibonacci_GetResult_Response_",
    ),
    cancel: service_info(
      "action_msgs::srv::dds_::CancelGoal_Request_",
      "action_msgs::srv::dds_::CancelGoal_Response_",
    ),
    feedback: topic_info("example_interfaces::action::dds_::Fibonacci_FeedbackMessage_"),
    status: topic_info("action_msgs::msg::dds_::GoalStatusArray_"),
  }
}

fn register_types(enabler: &Arc<DdsEnabler>) {
  let info = action_types();
  for topic in [
    &info.goal.request,
    &info.goal.reply,
    &info.result.request,
    &info.result.reply,
    &info.cancel.request,
    &info.cancel.reply,
    &info.feedback,
    &info.status,
  ] {
    let support = JsonTypeSupport::new(
      &topic.type_name,
      &format!("struct {} {{}};", topic.type_name.rsplit("::").next().unwrap_or("T")),
      json!({}),
    );
    let type_id = support.identifier();
    enabler.add_schema(Arc::new(support) as DynamicType, type_id);
  }
}

fn fibonacci(sequence: &mut Vec<u64>) {
  match sequence.len() {
    0 => sequence.push(0),
    1 => sequence.push(1),
    n => sequence.push(sequence[n - 1] + sequence[n - 2]),
  }
}

fn main() -> ExitCode {
  pretty_env_logger::init();
  let args = Args::parse();

  if let Some(config) = &args.config {
    println!("Configuration file {} accepted (loopback demo, nothing to load).", config.display());
  }

  let bus = LoopbackBus::new();
  let action_name = args.action_name.clone();

  // Server side: accept goals, compute with feedback, honor cancels.
  let server_slot: Arc<Mutex<Option<Arc<DdsEnabler>>>> = Arc::default();
  let cancel_flag = Arc::new(AtomicBool::new(false));
  let server = {
    let mut callbacks = CallbackSet::default();
    let name = action_name.clone();
    callbacks.action.action_query =
      Some(Box::new(move |queried| (queried == name).then(action_types)));

    let slot = Arc::clone(&server_slot);
    let flag = Arc::clone(&cancel_flag);
    let verbose = args.role == Role::Server;
    callbacks.action.action_goal_request_notification =
      Some(Box::new(move |action, goal_json, goal_id, _publish_time| {
        let order = serde_json::from_str::<serde_json::Value>(goal_json)
          .ok()
          .and_then(|v| v["order"].as_u64())
          .unwrap_or(0);
        if verbose {
          println!("[server] goal {goal_id}: order {order}");
        }

        // Execute in a worker; the verdict must go back first.
        let slot = Arc::clone(&slot);
        let flag = Arc::clone(&flag);
        let action = action.to_string();
        let goal_id = *goal_id;
        thread::spawn(move || {
          let Some(enabler) = slot.lock().unwrap().clone() else { return };
          let _ = enabler.update_action_status(&action, goal_id, StatusCode::Executing);

          let mut sequence: Vec<u64> = Vec::new();
          for _ in 0..order {
            thread::sleep(Duration::from_millis(50));
            if flag.load(Ordering::SeqCst) {
              let _ = enabler.update_action_status(&action, goal_id, StatusCode::Canceling);
              let result = json!({ "sequence": sequence }).to_string();
              let _ =
                enabler.send_action_result(&action, goal_id, StatusCode::Canceled, &result);
              let _ = enabler.update_action_status(&action, goal_id, StatusCode::Canceled);
              return;
            }
            fibonacci(&mut sequence);
            let feedback = json!({ "partial_sequence": sequence }).to_string();
            if let Err(e) = enabler.send_action_feedback(&action, &feedback, goal_id) {
              eprintln!("[server] feedback failed: {e}");
              return;
            }
          }
          let result = json!({ "sequence": sequence }).to_string();
          let _ = enabler.send_action_result(&action, goal_id, StatusCode::Succeeded, &result);
          let _ = enabler.update_action_status(&action, goal_id, StatusCode::Succeeded);
        });
        true
      }));

    let slot = Arc::clone(&server_slot);
    let flag = Arc::clone(&cancel_flag);
    callbacks.action.action_cancel_request_notification = Some(Box::new(
      move |action, goal_id, _timestamp, request_id, _publish_time| {
        flag.store(true, Ordering::SeqCst);
        let goals = if goal_id.is_zero() { vec![] } else { vec![*goal_id] };
        if let Some(enabler) = slot.lock().unwrap().clone() {
          let _ = enabler.send_action_cancel_goal_reply(
            action,
            &goals,
            CancelCode::None,
            request_id,
          );
        }
      },
    ));

    let enabler = DdsEnabler::new(EnablerConfiguration::default(), callbacks, bus.clone(), None);
    register_types(&enabler);
    bus.join("server", &enabler);
    *server_slot.lock().unwrap() = Some(Arc::clone(&enabler));
    enabler
  };

  // Client side: follow feedback and wait for the result.
  type Outcome = Option<(StatusCode, String)>;
  let outcome: Arc<(Mutex<Outcome>, Condvar)> = Arc::new((Mutex::new(None), Condvar::new()));
  let client_slot: Arc<Mutex<Option<Arc<DdsEnabler>>>> = Arc::default();
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

    let verbose = args.role == Role::Client;
    let feedback_seen = Arc::new(Mutex::new(0u32));
    let slot = Arc::clone(&client_slot);
    let cancel_requested = args.cancel_requests;
    callbacks.action.action_feedback_notification =
      Some(Box::new(move |action, json, goal_id, _publish_time| {
        if verbose {
          println!("[client] feedback: {json}");
        }
        let mut seen = feedback_seen.lock().unwrap();
        *seen += 1;
        if cancel_requested && *seen == 2 {
          if let Some(enabler) = slot.lock().unwrap().clone() {
            println!("[client] canceling goal {goal_id}");
            let _ = enabler.cancel_action_goal(action, *goal_id, 0);
          }
        }
      }));

    let statuses = Arc::new(Mutex::new(Vec::<StatusCode>::new()));
    let status_log = Arc::clone(&statuses);
    callbacks.action.action_status_notification = Some(Box::new(
      move |_action, goal_id, status, message, _publish_time| {
        if verbose {
          println!("[client] goal {goal_id} status: {message}");
        }
        status_log.lock().unwrap().push(status);
      },
    ));

    let waiter = Arc::clone(&outcome);
    callbacks.action.action_result_notification =
      Some(Box::new(move |_action, json, _goal_id, _publish_time| {
        let (slot, cv) = &*waiter;
        *slot.lock().unwrap() = Some((StatusCode::Unknown, json.to_string()));
        cv.notify_all();
      }));

    let enabler = DdsEnabler::new(EnablerConfiguration::default(), callbacks, bus.clone(), None);
    register_types(&enabler);
    bus.join("client", &enabler);
    *client_slot.lock().unwrap() = Some(Arc::clone(&enabler));
    enabler
  };

  if let Err(e) = server.announce_action(&action_name) {
    eprintln!("Cannot announce action {action_name}: {e}");
    return ExitCode::FAILURE;
  }
  thread::sleep(Duration::from_millis(100)); // let discovery settle

  if args.request_initial_wait > 0 {
    thread::sleep(Duration::from_secs(args.request_initial_wait));
  }

  let goal = json!({ "order": args.expected_requests }).to_string();
  match client.send_action_goal(&action_name, &goal) {
    Ok(goal_id) => println!("Sent goal {goal_id}: {goal}"),
    Err(e) => {
      eprintln!("Goal failed: {e}");
      return ExitCode::FAILURE;
    }
  }

  let (result, cv) = &*outcome;
  let guard = result.lock().unwrap();
  let (guard, _timeout) = cv
    .wait_timeout_while(guard, Duration::from_secs(args.timeout), |r| r.is_none())
    .unwrap();
  match &*guard {
    Some((_, json)) => {
      println!("Result: {json}");
      ExitCode::SUCCESS
    }
    None => {
      eprintln!("Timed out waiting for the result.");
      ExitCode::FAILURE
    }
  }
}
