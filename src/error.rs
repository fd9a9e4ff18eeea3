use crate::qmi;
use crate::ril;
use crate::sim;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Parcel(ril::parcel::ParcelError),
    Qmi(qmi::QmiError),
    Sim(sim::SimError),
    /// A fixed-capacity registry or chain ran out of slots.
    Capacity,

    _Unknown,
}

impl From<ril::parcel::ParcelError> for Error {
    fn from(e: ril::parcel::ParcelError) -> Self {
        Error::Parcel(e)
    }
}

impl From<qmi::QmiError> for Error {
    fn from(e: qmi::QmiError) -> Self {
        Error::Qmi(e)
    }
}

impl From<sim::SimError> for Error {
    fn from(e: sim::SimError) -> Self {
        Error::Sim(e)
    }
}
