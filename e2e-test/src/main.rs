// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use astarte_mot::astarte_mot_protocol::{DeviceId, Error, MomType, Oxm};
use astarte_mot::event::{self, EventReceiver};
use astarte_mot::storage::FileStore;
use astarte_mot::{MotConfig, MotManager, ProvisionResult};
use clap::{Parser, Subcommand};
use eyre::{bail, eyre};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zeroize::Zeroizing;

use self::sim::{Network, SimSession, SimTransport};

mod sim;

const OWNER: &str = "5375624f-776e-6572-4d4f-545465737400";

type Manager = MotManager<SimTransport, SimSession, FileStore, &'static str>;
type Completed = Arc<Mutex<Vec<ProvisionResult<&'static str>>>>;

#[derive(Debug, Parser)]
struct Cli {
    #[arg(long, default_value = ".tmp/mot-astarte")]
    storage: PathBuf,

    /// Identifier of the sub owner `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
    #[arg(long, default_value = OWNER)]
    owner: DeviceId,

    /// Number of simulated devices
    #[arg(long, default_value_t = 2)]
    devices: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Transfer with the PIN shown on the display of the devices
    RandomPin {
        /// Number of wrong PINs typed before the right one
        #[arg(long, default_value_t = 0)]
        wrong_pins: u8,
    },
    /// Transfer with a PIN provisioned by the super owner
    PreconfiguredPin {
        #[arg(long, default_value = "12345678")]
        pin: String,
    },
}

fn collect(completed: &Completed) -> impl FnOnce(ProvisionResult<&'static str>) + Send + 'static {
    let completed = Arc::clone(completed);

    move |res: ProvisionResult<&'static str>| {
        if let Ok(mut completed) = completed.lock() {
            completed.push(res);
        }
    }
}

/// Handles the events and checks the results of the completed operations.
async fn settle(
    manager: &mut Manager,
    events: &mut EventReceiver,
    completed: &Completed,
) -> eyre::Result<()> {
    manager.run(events).await?;

    let results: Vec<_> = completed
        .lock()
        .map_err(|_| eyre!("results lock poisoned"))?
        .drain(..)
        .collect();

    for res in results {
        for entry in &res.results {
            info!(op = res.ctx, device = %entry.device_id, result = %entry.result, "completed");
        }

        if res.has_error {
            bail!("{} failed", res.ctx);
        }
    }

    Ok(())
}

impl Command {
    async fn run(
        self,
        manager: &mut Manager,
        network: &Network,
        events: &mut EventReceiver,
    ) -> eyre::Result<()> {
        let completed = Completed::default();

        let oxm = match &self {
            Command::RandomPin { .. } => Oxm::RandomDevicePin,
            Command::PreconfiguredPin { pin } => {
                for mut device in network.discover()? {
                    manager
                        .add_transfer_method(
                            "add method",
                            &mut device,
                            Oxm::PreconfigPin,
                            collect(&completed),
                        )
                        .await?;
                    manager
                        .provision_preconfigured_pin(
                            "provision pin",
                            &device,
                            pin.as_bytes(),
                            collect(&completed),
                        )
                        .await?;
                    manager
                        .add_preconfigured_pin(&device, pin.as_bytes())
                        .await?;
                }

                settle(manager, events, &completed).await?;

                Oxm::PreconfigPin
            }
        };

        // pick up the methods added above
        for device in network.discover()? {
            manager
                .change_transfer_mode("change mode", &device, MomType::Enable, collect(&completed))
                .await?;
        }

        settle(manager, events, &completed).await?;

        // refresh the supported methods
        for device in network.discover()? {
            manager
                .select_transfer_method("select method", &device, oxm, collect(&completed))
                .await?;
        }

        settle(manager, events, &completed).await?;

        manager
            .start_multi_owner_transfer("transfer", network.discover()?, collect(&completed))
            .await?;

        settle(manager, events, &completed).await?;

        for (device, sub_owners) in network.sub_owners()? {
            let owner = &manager.config().owner_id;

            if !sub_owners.contains(owner) {
                bail!("sub owner missing on device {device}");
            }

            info!(%device, sub_owners = sub_owners.len(), "device transferred");
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive("info".parse()?)
                .from_env_lossy(),
        )
        .try_init()?;

    info!(owner = %cli.owner, "sub owner");

    let (tx, mut rx) = event::channel();
    let network = Network::new(cli.devices, &[Oxm::JustWorks, Oxm::RandomDevicePin], tx);

    let mut wrong_pins = match cli.command {
        Command::RandomPin { wrong_pins } => wrong_pins,
        Command::PreconfiguredPin { .. } => 0,
    };

    let display = network.clone();
    let pin_input = move |device: &DeviceId| -> Result<Zeroizing<Vec<u8>>, Error> {
        if wrong_pins > 0 {
            wrong_pins -= 1;

            warn!(%device, "typing a wrong PIN");

            return Ok(Zeroizing::new(b"wrongpin".to_vec()));
        }

        display.display_pin(device)
    };

    let store = FileStore::open(cli.storage).await?;

    let mut manager: Manager = MotManager::new(
        MotConfig::new(cli.owner),
        SimTransport(network.clone()),
        SimSession(network.clone()),
        store,
        pin_input,
    );

    cli.command.run(&mut manager, &network, &mut rx).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn transfer(command: Command) -> (Network, eyre::Result<()>) {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = event::channel();
        let network = Network::new(2, &[Oxm::JustWorks, Oxm::RandomDevicePin], tx);

        let display = network.clone();
        let store = FileStore::open(dir.path().to_path_buf()).await.unwrap();
        let mut manager: Manager = MotManager::new(
            MotConfig::new(OWNER.parse().unwrap()),
            SimTransport(network.clone()),
            SimSession(network.clone()),
            store,
            move |device: &DeviceId| -> Result<Zeroizing<Vec<u8>>, Error> {
                display.display_pin(device)
            },
        );

        let res = command.run(&mut manager, &network, &mut rx).await;

        (network, res)
    }

    #[tokio::test]
    async fn preconfigured_pin_transfer() {
        let (network, res) = transfer(Command::PreconfiguredPin {
            pin: "12345678".to_string(),
        })
        .await;

        res.unwrap();

        for device in network.discover().unwrap() {
            assert!(device.doxm.supports(Oxm::PreconfigPin));
            assert_eq!(device.doxm.oxm_sel, Oxm::PreconfigPin);
        }
    }

    #[tokio::test]
    async fn random_pin_transfer() {
        let (network, res) = transfer(Command::RandomPin { wrong_pins: 0 }).await;

        res.unwrap();

        let owner: DeviceId = OWNER.parse().unwrap();
        for (_, sub_owners) in network.sub_owners().unwrap() {
            assert_eq!(sub_owners, [owner]);
        }
    }
}
