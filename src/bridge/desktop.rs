//! 桌面通知后端
//!
//! Linux 使用 `notify-send`，macOS 使用 `osascript`，其他平台报告 `Unsupported`。

use super::{NativeAlert, NativeNotifier, PermissionState};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    NotifySend(PathBuf),
    AppleScript(PathBuf),
}

/// 桌面通知
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
    backend: Option<Backend>,
}

impl DesktopNotifier {
    /// 探测当前平台可用的通知命令
    pub fn detect(app_name: &str) -> Self {
        let backend = if cfg!(target_os = "macos") {
            which::which("osascript").ok().map(Backend::AppleScript)
        } else if cfg!(target_os = "linux") {
            which::which("notify-send").ok().map(Backend::NotifySend)
        } else {
            None
        };
        debug!(backend = ?backend, "Desktop notifier detected");

        Self {
            app_name: app_name.to_string(),
            backend,
        }
    }

    /// 没有任何后端（测试或禁用时）
    pub fn unsupported(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            backend: None,
        }
    }

    fn command(&self, alert: &NativeAlert) -> Result<Command> {
        match &self.backend {
            Some(Backend::NotifySend(path)) => {
                let mut cmd = Command::new(path);
                cmd.arg("--app-name")
                    .arg(&self.app_name)
                    // 同一 tag 的通知互相替换
                    .arg("--hint")
                    .arg(format!("string:x-canonical-private-synchronous:{}", alert.tag));
                if let Some(timeout) = alert.timeout {
                    cmd.arg("--expire-time").arg(timeout.as_millis().to_string());
                }
                cmd.arg(&alert.title).arg(&alert.body);
                Ok(cmd)
            }
            Some(Backend::AppleScript(path)) => {
                let mut cmd = Command::new(path);
                cmd.arg("-e").arg(apple_script(&self.app_name, alert));
                Ok(cmd)
            }
            None => Err(anyhow!("no desktop notification backend available")),
        }
    }
}

impl NativeNotifier for DesktopNotifier {
    fn name(&self) -> &str {
        match self.backend {
            Some(Backend::NotifySend(_)) => "notify-send",
            Some(Backend::AppleScript(_)) => "osascript",
            None => "none",
        }
    }

    fn permission(&self) -> PermissionState {
        if self.backend.is_some() {
            PermissionState::Granted
        } else {
            PermissionState::Unsupported
        }
    }

    fn request_permission(&self) -> Result<PermissionState> {
        Ok(self.permission())
    }

    fn show(&self, alert: &NativeAlert) -> Result<()> {
        let mut child = self
            .command(alert)?
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning {}", self.name()))?;

        // 不阻塞调用方，后台回收子进程
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }

    fn dismiss(&self, _tag: &str) -> Result<()> {
        // 两个后端都由系统按 expire-time 自行收起
        Ok(())
    }
}

fn apple_script(app_name: &str, alert: &NativeAlert) -> String {
    format!(
        "display notification \"{}\" with title \"{}\" subtitle \"{}\"",
        escape_apple(&alert.body),
        escape_apple(app_name),
        escape_apple(&alert.title)
    )
}

fn escape_apple(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn alert() -> NativeAlert {
        NativeAlert {
            tag: "n1".to_string(),
            title: "Low Stock Alert".to_string(),
            body: "Widget \"Pro\" has 2 left".to_string(),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_unsupported_backend() {
        let notifier = DesktopNotifier::unsupported("shop");
        assert_eq!(notifier.name(), "none");
        assert_eq!(notifier.permission(), PermissionState::Unsupported);
        assert!(notifier.show(&alert()).is_err());
        assert!(notifier.dismiss("n1").is_ok());
    }

    #[test]
    fn test_notify_send_arguments() {
        let notifier = DesktopNotifier {
            app_name: "shop".to_string(),
            backend: Some(Backend::NotifySend(PathBuf::from("/usr/bin/notify-send"))),
        };
        let cmd = notifier.command(&alert()).unwrap();
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(cmd.get_program(), "/usr/bin/notify-send");
        assert!(args.contains(&"string:x-canonical-private-synchronous:n1".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--expire-time" && w[1] == "5000"));
        assert_eq!(args.last().map(String::as_str), Some("Widget \"Pro\" has 2 left"));
    }

    #[test]
    fn test_apple_script_escaping() {
        let script = apple_script("shop", &alert());
        assert!(script.starts_with("display notification \"Widget \\\"Pro\\\" has 2 left\""));
        assert!(script.contains("subtitle \"Low Stock Alert\""));
    }
}
