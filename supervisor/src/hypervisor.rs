//! Abstraction over the external hypervisor CLI used to spawn and
//! destroy instances. The original instance manager shelled out to
//! `xl`/`rumprun`; this treats that program as an opaque, configurable
//! external collaborator instead of hard-coding it.

use std::process::Command;

use common::Mac;

#[derive(Debug, thiserror::Error)]
pub enum HypervisorError {
    #[error("launching hypervisor CLI {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("hypervisor CLI exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },
}

/// Spawns and destroys instances. Implementations own whatever handle
/// (subprocess, RPC client, ...) the underlying hypervisor needs.
pub trait Hypervisor: Send + Sync {
    /// Launch a new instance bound to `mac`, tagged `name` for operator
    /// visibility. The instance's domain id is learned later, out of
    /// band, once it registers itself on the bus.
    fn spawn(&self, mac: &Mac, name: &str) -> Result<(), HypervisorError>;

    /// Tear down a running instance by domain id.
    fn destroy(&self, domain_id: u32) -> Result<(), HypervisorError>;
}

/// Drives an external CLI via subprocess. `{mac}`/`{name}`/`{domid}`
/// placeholders in the configured argument templates are substituted
/// before the command runs.
pub struct ShellHypervisor {
    create_program: String,
    create_args: Vec<String>,
    destroy_program: String,
    destroy_args: Vec<String>,
}

impl ShellHypervisor {
    pub fn new(
        create_program: impl Into<String>,
        create_args: Vec<String>,
        destroy_program: impl Into<String>,
        destroy_args: Vec<String>,
    ) -> Self {
        ShellHypervisor {
            create_program: create_program.into(),
            create_args,
            destroy_program: destroy_program.into(),
            destroy_args,
        }
    }
}

impl Hypervisor for ShellHypervisor {
    fn spawn(&self, mac: &Mac, name: &str) -> Result<(), HypervisorError> {
        let mac_str = mac.to_string();
        let args: Vec<String> = self
            .create_args
            .iter()
            .map(|arg| arg.replace("{mac}", &mac_str).replace("{name}", name))
            .collect();
        run(&self.create_program, &args)
    }

    fn destroy(&self, domain_id: u32) -> Result<(), HypervisorError> {
        let id_str = domain_id.to_string();
        let args: Vec<String> = self
            .destroy_args
            .iter()
            .map(|arg| arg.replace("{domid}", &id_str))
            .collect();
        run(&self.destroy_program, &args)
    }
}

fn run(program: &str, args: &[String]) -> Result<(), HypervisorError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| HypervisorError::Spawn { program: program.to_string(), source })?;
    if !output.status.success() {
        return Err(HypervisorError::NonZeroExit {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}
